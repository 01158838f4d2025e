// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;
use std::time::Duration;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Outputs the given duration in a minutes:seconds.millis format.
pub fn duration_display(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() % 60;
    format!("{}:{:02}.{:03}", minutes, secs, duration.subsec_millis())
}

/// Formats a byte count with a binary unit suffix.
pub fn bytes_display(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use crate::util::{bytes_display, duration_display, filename_display};

    #[test]
    fn test_duration_display() {
        assert_eq!("0:00.000", duration_display(Duration::new(0, 0)));
        assert_eq!("0:05.250", duration_display(Duration::from_millis(5250)));
        assert_eq!("1:00.000", duration_display(Duration::new(60, 0)));
        assert_eq!("60:06.001", duration_display(Duration::from_millis(3_606_001)));
    }

    #[test]
    fn test_bytes_display() {
        assert_eq!("0 B", bytes_display(0));
        assert_eq!("1023 B", bytes_display(1023));
        assert_eq!("1.5 KiB", bytes_display(1536));
        assert_eq!("4.0 MiB", bytes_display(4 << 20));
        assert_eq!("2048.0 GiB", bytes_display(2 << 40));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("song.spool", filename_display(Path::new("/tmp/song.spool")));
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }
}

//! Human-readable formatting for the CLI front-end.

/// Format a byte count as B/KB/MB/GB with two decimals.
pub fn format_file_size(bytes: u64) -> String {
  const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

  if bytes == 0 {
    return "0 B".to_string();
  }

  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }

  if unit == 0 {
    format!("{} B", bytes)
  } else {
    format!("{:.2} {}", value, UNITS[unit])
  }
}

/// Format a duration in whole seconds.
pub fn format_duration(seconds: u64) -> String {
  if seconds < 60 {
    format!("{}s", seconds)
  } else if seconds < 3600 {
    format!("{}m {}s", seconds / 60, seconds % 60)
  } else {
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bytes_stay_whole() {
    assert_eq!(format_file_size(0), "0 B");
    assert_eq!(format_file_size(500), "500 B");
    assert_eq!(format_file_size(1023), "1023 B");
  }

  #[test]
  fn test_kilobytes_get_two_decimals() {
    assert_eq!(format_file_size(2048), "2.00 KB");
    assert_eq!(format_file_size(1536), "1.50 KB");
  }

  #[test]
  fn test_larger_units() {
    assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
  }

  #[test]
  fn test_duration_units() {
    assert_eq!(format_duration(45), "45s");
    assert_eq!(format_duration(90), "1m 30s");
    assert_eq!(format_duration(3720), "1h 2m");
  }
}

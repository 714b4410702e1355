//! Human-readable sizes and percentages, shared by the summaries and the
//! per-file progress lines.

use crate::constants::DOWNLOAD_BYTES_PER_SECOND;
use std::time::Duration;

const SIZE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];
const THRESHOLD: f64 = 1024.0;

/// Format a byte count with up to two decimals, trailing zeros dropped
///
/// # Examples
/// ```
/// use squeeze_box::utils::format_size;
///
/// assert_eq!(format_size(0), "0 Bytes");
/// assert_eq!(format_size(1024), "1 KB");
/// assert_eq!(format_size(1536), "1.5 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < SIZE_UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    let rendered = format!("{:.2}", size);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit_index])
}

/// Whole-number percentage, e.g. `42%`
pub fn format_percentage(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

/// Bytes saved between two sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Savings {
    /// Negative when the output grew
    pub bytes: i64,
    pub percentage: f64,
}

pub fn calculate_savings(original_size: u64, compressed_size: u64) -> Savings {
    let bytes = original_size as i64 - compressed_size as i64;
    let percentage = if original_size > 0 {
        bytes as f64 / original_size as f64 * 100.0
    } else {
        0.0
    };
    Savings { bytes, percentage }
}

/// Reduction percentage that never reports growth as a negative number.
pub fn reduction_percent(original_size: u64, compressed_size: u64) -> f64 {
    calculate_savings(original_size, compressed_size)
        .percentage
        .max(0.0)
}

/// Download time saved, assuming one second per MiB. Growth saves nothing.
pub fn estimated_time_saved(original_size: u64, compressed_size: u64) -> Duration {
    let saved = original_size.saturating_sub(compressed_size) as f64;
    Duration::from_secs((saved / DOWNLOAD_BYTES_PER_SECOND as f64).round() as u64)
}

/// Savings line used in summaries, e.g. `1.5 KB (25%)` or `+200 Bytes (-10%)`
pub fn describe_savings(original_size: u64, compressed_size: u64) -> String {
    let savings = calculate_savings(original_size, compressed_size);
    if savings.bytes >= 0 {
        format!(
            "{} ({})",
            format_size(savings.bytes as u64),
            format_percentage(savings.percentage)
        )
    } else {
        format!(
            "+{} ({})",
            format_size(savings.bytes.unsigned_abs()),
            format_percentage(savings.percentage)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1 GB");
        assert_eq!(format_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(42.4), "42%");
        assert_eq!(format_percentage(42.6), "43%");
        assert_eq!(format_percentage(-10.0), "-10%");
    }

    #[test]
    fn test_calculate_savings() {
        assert_eq!(
            calculate_savings(1000, 800),
            Savings {
                bytes: 200,
                percentage: 20.0
            }
        );
        assert_eq!(calculate_savings(1000, 1200).bytes, -200);
        assert_eq!(calculate_savings(1000, 1200).percentage, -20.0);
        assert_eq!(calculate_savings(0, 500).percentage, 0.0);
    }

    #[test]
    fn test_reduction_percent_is_clamped() {
        assert_eq!(reduction_percent(1000, 750), 25.0);
        assert_eq!(reduction_percent(1000, 1500), 0.0);
        assert_eq!(reduction_percent(0, 10), 0.0);
    }

    #[test]
    fn test_estimated_time_saved() {
        let mib = 1024 * 1024;
        assert_eq!(estimated_time_saved(3 * mib, mib), Duration::from_secs(2));
        assert_eq!(estimated_time_saved(mib, mib / 3), Duration::from_secs(1));
        assert_eq!(estimated_time_saved(mib, 2 * mib), Duration::ZERO);
    }

    #[test]
    fn test_describe_savings() {
        assert_eq!(describe_savings(4096, 2048), "2 KB (50%)");
        assert_eq!(describe_savings(1000, 1100), "+100 Bytes (-10%)");
    }
}

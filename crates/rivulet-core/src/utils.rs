//! Formatting and arithmetic helpers shared by the orchestrator

use std::time::Duration;

/// Format bytes to human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format speed to human-readable string
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format an ETA, `--` when unbounded
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "--".to_string();
    };

    let seconds = eta.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Calculate progress fraction in [0, 1]
pub fn calculate_progress(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64).min(1.0)
}

/// Time to fetch `remaining` bytes at `rate` bytes/s, if both are positive
///
/// Estimates too large to represent are `None`.
pub fn estimate_eta(remaining: u64, rate: f64) -> Option<Duration> {
    if remaining == 0 || !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(remaining as f64 / rate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "--");
        assert_eq!(format_eta(Some(Duration::from_secs(42))), "42s");
        assert_eq!(format_eta(Some(Duration::from_secs(3725))), "1h 2m");
        assert_eq!(format_eta(Some(Duration::from_secs(90_000))), "1d 1h");
    }

    #[test]
    fn test_calculate_progress_clamps() {
        assert_eq!(calculate_progress(0, 0), 0.0);
        assert_eq!(calculate_progress(50, 100), 0.5);
        assert_eq!(calculate_progress(150, 100), 1.0);
    }

    #[test]
    fn test_estimate_eta() {
        assert_eq!(estimate_eta(1000, 250.0), Some(Duration::from_secs(4)));
        assert_eq!(estimate_eta(0, 250.0), None);
        assert_eq!(estimate_eta(1000, 0.0), None);
        assert_eq!(estimate_eta(1000, f64::NAN), None);
        assert_eq!(estimate_eta(1_000_000_000, 1e-12), None);
        assert_eq!(estimate_eta(u64::MAX, f64::MIN_POSITIVE), None);
    }
}

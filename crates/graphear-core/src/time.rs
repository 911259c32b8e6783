//! Playback clock formatting.

/// Format a position in seconds as `M:SS`.
///
/// Minutes are unpadded, seconds are zero-padded. NaN, negative and infinite
/// inputs (metadata not loaded yet, live streams) render as `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let min = (seconds / 60.0).floor() as u64;
    let sec = (seconds % 60.0).floor() as u64;
    format!("{min}:{sec:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_padded_seconds() {
        assert_eq!(format_time(125.0), "2:05");
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(59.99), "0:59");
        assert_eq!(format_time(600.0), "10:00");
    }

    #[test]
    fn invalid_inputs_render_zero() {
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(f64::INFINITY), "0:00");
    }

    #[test]
    fn long_durations_keep_unpadded_minutes() {
        assert_eq!(format_time(3725.4), "62:05");
    }
}

//! Timestamp validation and formatting utilities.
//!
//! Frame and caption timestamps are plain seconds (`f64`) measured from the
//! start of the video. Everything downstream assumes they are finite,
//! non-negative and no later than the video duration.

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Validate a frame timestamp in seconds.
///
/// # Examples
/// ```
/// use scribe_models::timestamp::validate_timestamp;
/// assert_eq!(validate_timestamp(90.0).unwrap(), 90.0);
/// assert!(validate_timestamp(-1.0).is_err());
/// ```
pub fn validate_timestamp(secs: f64) -> Result<f64, TimestampError> {
    if !secs.is_finite() {
        return Err(TimestampError::NotFinite);
    }
    if secs < 0.0 {
        return Err(TimestampError::Negative(secs));
    }
    if secs > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_VIDEO_DURATION_SECS));
    }
    Ok(secs)
}

/// Clamp a timestamp into `[0, duration]`.
///
/// A non-positive duration means "unknown" and only clamps the lower bound.
pub fn clamp_to_duration(secs: f64, duration: f64) -> f64 {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    if duration > 0.0 {
        secs.min(duration)
    } else {
        secs
    }
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    // Include milliseconds if present
    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// Timestamp validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampError {
    /// NaN or infinite
    NotFinite,
    /// Timestamp is below zero
    Negative(f64),
    /// Timestamp exceeds maximum allowed duration
    ExceedsMaxDuration(f64),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinite => write!(f, "Timestamp must be a finite number of seconds"),
            Self::Negative(secs) => write!(f, "Timestamp cannot be negative ({:.3}s)", secs),
            Self::ExceedsMaxDuration(max) => {
                write!(f, "Timestamp exceeds maximum allowed duration ({} hours)", max / 3600.0)
            }
        }
    }
}

impl std::error::Error for TimestampError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_timestamp() {
        assert_eq!(validate_timestamp(0.0).unwrap(), 0.0);
        assert_eq!(validate_timestamp(1799.5).unwrap(), 1799.5);
        assert!(matches!(validate_timestamp(-0.5), Err(TimestampError::Negative(_))));
        assert!(matches!(validate_timestamp(f64::NAN), Err(TimestampError::NotFinite)));
        assert!(matches!(
            validate_timestamp(MAX_VIDEO_DURATION_SECS + 1.0),
            Err(TimestampError::ExceedsMaxDuration(_))
        ));
    }

    #[test]
    fn test_clamp_to_duration() {
        assert_eq!(clamp_to_duration(-3.0, 100.0), 0.0);
        assert_eq!(clamp_to_duration(150.0, 100.0), 100.0);
        assert_eq!(clamp_to_duration(42.0, 100.0), 42.0);
        // Unknown duration only clamps below
        assert_eq!(clamp_to_duration(150.0, 0.0), 150.0);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00");
        assert_eq!(format_seconds(90.0), "00:01:30");
        assert_eq!(format_seconds(3661.0), "01:01:01");
        assert_eq!(format_seconds(900.5), "00:15:00.500");
    }
}

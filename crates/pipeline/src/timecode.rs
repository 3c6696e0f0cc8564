//! Timecode conversion between `HH:MM:SS.mmm` strings and seconds.
//!
//! Edit decision lists and detection sidecars store positions as
//! millisecond-precision timecodes; both directions must round-trip exactly.

use thiserror::Error;

/// Error type for timecode parsing
#[derive(Debug, Error)]
pub enum TimecodeError {
    /// The string does not have the `HH:MM:SS.mmm` shape
    #[error("Invalid timecode: {0:?}")]
    InvalidFormat(String),
}

/// Parse a `HH:MM:SS.mmm` position into seconds.
pub fn position_in_seconds(timecode: &str) -> Result<f64, TimecodeError> {
    let mut parts = timecode.splitn(3, ':');

    let (hours, mins, secs) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(s)) => (h, m, s),
        _ => return Err(TimecodeError::InvalidFormat(timecode.to_string())),
    };

    let hours: u64 = hours
        .parse()
        .map_err(|_| TimecodeError::InvalidFormat(timecode.to_string()))?;
    let mins: u64 = mins
        .parse()
        .map_err(|_| TimecodeError::InvalidFormat(timecode.to_string()))?;
    let secs: f64 = secs
        .parse()
        .map_err(|_| TimecodeError::InvalidFormat(timecode.to_string()))?;

    if mins >= 60 || !(0.0..60.0).contains(&secs) {
        return Err(TimecodeError::InvalidFormat(timecode.to_string()));
    }

    Ok((hours * 3600 + mins * 60) as f64 + secs)
}

/// Render a position in seconds as a `HH:MM:SS.mmm` timecode.
///
/// The value is rounded to the nearest millisecond so that
/// [`position_in_seconds`] reproduces it exactly.
pub fn seconds_to_position(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;

    let hours = total_millis / 3_600_000;
    let mins = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_position_in_seconds() {
        assert_eq!(position_in_seconds("00:00:00.000").unwrap(), 0.0);
        assert_eq!(position_in_seconds("00:00:44.401").unwrap(), 44.401);
        assert_eq!(position_in_seconds("00:18:18.440").unwrap(), 1098.44);
        assert_eq!(position_in_seconds("01:00:00.000").unwrap(), 3600.0);
    }

    #[test]
    fn test_seconds_to_position() {
        assert_eq!(seconds_to_position(44.4012), "00:00:44.401");
        assert_eq!(seconds_to_position(368.355), "00:06:08.355");
        assert_eq!(seconds_to_position(2053.96), "00:34:13.960");
        assert_eq!(seconds_to_position(2519.26), "00:41:59.260");
        assert_eq!(seconds_to_position(0.0), "00:00:00.000");
    }

    #[test]
    fn test_rejects_malformed_timecodes() {
        assert!(position_in_seconds("").is_err());
        assert!(position_in_seconds("12:34").is_err());
        assert!(position_in_seconds("aa:bb:cc").is_err());
        assert!(position_in_seconds("00:75:00.000").is_err());
        assert!(position_in_seconds("00:00:61.000").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        // Rendering then parsing a millisecond-precision position must be exact.
        #[test]
        fn prop_timecode_round_trip(millis in 0u64..86_400_000) {
            let seconds = millis as f64 / 1000.0;
            let rendered = seconds_to_position(seconds);
            let parsed = position_in_seconds(&rendered).unwrap();

            prop_assert!(
                (parsed - seconds).abs() < 5e-4,
                "{} -> {} -> {}",
                seconds, rendered, parsed
            );
        }
    }
}

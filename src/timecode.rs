//! `HH:MM:SS.mmm` timecodes as produced by the summarization step.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimecodeError {
    #[error("invalid timecode '{0}', expected HH:MM:SS or HH:MM:SS.mmm")]
    Malformed(String),
}

/// Convert a timecode into seconds.
///
/// The fractional part is read as milliseconds, so `.5` and `.500` are the
/// same instant. Minutes and seconds must be below 60; hours are unbounded.
pub fn parse_seconds(timecode: &str) -> Result<f64, TimecodeError> {
    let malformed = || TimecodeError::Malformed(timecode.to_string());

    let mut parts = timecode.trim().split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let (seconds, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };

    let hours = digits(hours).ok_or_else(malformed)?;
    let minutes = digits(minutes).ok_or_else(malformed)?;
    let seconds = digits(seconds).ok_or_else(malformed)?;
    if minutes >= 60 || seconds >= 60 {
        return Err(malformed());
    }

    let millis = match fraction {
        None => 0,
        Some(fraction) if (1..=3).contains(&fraction.len()) => {
            digits(&format!("{fraction:0<3}")).ok_or_else(malformed)?
        }
        Some(_) => return Err(malformed()),
    };

    Ok((hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0)
}

fn digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

//! Leading-digit extraction.

/// First significant decimal digit (1-9) of a strictly positive finite value.
///
/// Uses the shortest round-trip scientific representation, so values like
/// `0.1 + 0.2` report the digit a human would read (3), not an artefact of
/// binary rounding.
pub fn leading_digit(value: f64) -> Option<u8> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let repr = format!("{:e}", value);
    let first = repr.as_bytes().first()?;
    match first {
        b'1'..=b'9' => Some(first - b'0'),
        _ => None,
    }
}

/// First decimal digit of a positive integer.
pub fn leading_digit_u64(mut value: u64) -> Option<u8> {
    if value == 0 {
        return None;
    }
    while value >= 10 {
        value /= 10;
    }
    Some(value as u8)
}

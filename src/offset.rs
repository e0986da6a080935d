use serde::{Deserialize, Serialize};

/// A skip or progress offset, either a point in time or a share of the ad duration
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Offset {
    /// Seconds from the start of the creative
    Time(u32),

    /// Percentage of the creative duration, 0 to 100
    Percentage(u8),
}

/// Parse an offset attribute value.
///
/// Accepts `HH:MM:SS` and `N%`. Anything else is treated as "not present".
pub fn parse_offset(text: &str) -> Option<Offset> {
    let text = text.trim();

    if let Some(value) = text.strip_suffix('%') {
        return parse_percentage(value).map(Offset::Percentage);
    }

    parse_time(text).map(Offset::Time)
}

fn parse_percentage(value: &str) -> Option<u8> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let percentage = value.parse::<u8>().ok()?;
    (percentage <= 100).then_some(percentage)
}

fn parse_time(text: &str) -> Option<u32> {
    let mut parts = text.split(':');
    let hours = parse_component(parts.next()?)?;
    let minutes = parse_component(parts.next()?)?;
    let seconds = parse_component(parts.next()?)?;

    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }

    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)
}

fn parse_component(part: &str) -> Option<u32> {
    if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time() {
        assert_eq!(parse_offset("01:01:03"), Some(Offset::Time(3663)));
        assert_eq!(parse_offset("00:01:00"), Some(Offset::Time(60)));
        assert_eq!(parse_offset(" 00:00:05 "), Some(Offset::Time(5)));
    }

    #[test]
    fn parses_percentage() {
        assert_eq!(parse_offset("32%"), Some(Offset::Percentage(32)));
        assert_eq!(parse_offset("0%"), Some(Offset::Percentage(0)));
        assert_eq!(parse_offset("100%"), Some(Offset::Percentage(100)));
    }

    #[test]
    fn malformed_values_are_absent() {
        for text in ["", "%", "101%", "-5%", "3.5%", "1:01:03", "00:60:00", "00:00:61", "00:00", "00:00:00:00", "abc", "aa:bb:cc"] {
            assert_eq!(parse_offset(text), None, "{text:?}");
        }
    }
}

//! Human-readable duration parsing.
//!
//! Configuration values such as `scanInterval: 15s` or `staleThreshold: 1h30m`
//! are parsed once per load into [`Duration`]s. Parsing for configuration is
//! lenient: a bad value is logged and replaced by [`FALLBACK_DURATION`].

use std::time::Duration;
use tracing::warn;

/// Value used when a configured duration cannot be parsed.
pub const FALLBACK_DURATION: Duration = Duration::from_secs(30);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fraction digits past this many are below a nanosecond for every unit.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3600 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse `15s`, `5m`, `500ms`, `2.5m`, `250us` or a chain of them such as
/// `1h30m`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`, and every unit
/// takes a decimal fraction. A bare number is taken as seconds. Spaces
/// between a number and its unit are tolerated. Values too large for a
/// [`Duration`] are an error, not a wrap-around.
///
/// ```
/// use govee_exporter::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2.5m").unwrap(), Duration::from_secs(150));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // No suffix, treat as seconds
    if src.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return to_duration(scale(src, NANOS_PER_SEC, src)?, src);
    }

    let mut total: u128 = 0;
    let mut rest = src;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration: {}", src));
        }
        let number = &rest[..number_len];
        rest = rest[number_len..].trim_start();

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = rest[..unit_len].trim_end();
        rest = &rest[unit_len..];
        if unit.is_empty() {
            return Err(format!("missing unit in duration: {}", src));
        }

        let per_unit = unit_nanos(unit)
            .ok_or_else(|| format!("unknown unit '{}' in duration: {}", unit, src))?;
        total = total
            .checked_add(scale(number, per_unit, src)?)
            .ok_or_else(|| out_of_range(src))?;
    }

    to_duration(total, src)
}

/// `number` units of `per_unit` nanoseconds each. The fraction is truncated
/// to whole nanoseconds.
fn scale(number: &str, per_unit: u128, src: &str) -> Result<u128, String> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(format!("invalid number in duration: {}", src));
    }

    // Only digits remain, so a failed parse means the value does not fit
    let whole: u128 = match whole {
        "" => 0,
        digits => digits.parse().map_err(|_| out_of_range(src))?,
    };
    let mut nanos = whole.checked_mul(per_unit).ok_or_else(|| out_of_range(src))?;

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let numerator: u128 = fraction.parse().map_err(|_| out_of_range(src))?;
        let denominator = 10u128.pow(fraction.len() as u32);
        nanos = nanos
            .checked_add(numerator * per_unit / denominator)
            .ok_or_else(|| out_of_range(src))?;
    }
    Ok(nanos)
}

fn to_duration(nanos: u128, src: &str) -> Result<Duration, String> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).map_err(|_| out_of_range(src))?;
    Ok(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

fn out_of_range(src: &str) -> String {
    format!("duration out of range: {}", src)
}

/// Parse a configured duration, falling back to [`FALLBACK_DURATION`] with a
/// warning instead of failing.
pub fn parse_or_default(key: &str, src: &str) -> Duration {
    match parse_duration(src) {
        Ok(duration) => duration,
        Err(reason) => {
            warn!(
                key,
                value = src,
                %reason,
                "invalid duration, using {:?} as default",
                FALLBACK_DURATION
            );
            FALLBACK_DURATION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_parse() {
        let cases = [
            ("15s", Duration::from_secs(15)),
            ("30s", Duration::from_secs(30)),
            ("5m", Duration::from_secs(300)),
            ("15m", Duration::from_secs(900)),
        ];
        for (src, expected) in cases {
            assert_eq!(parse_duration(src), Ok(expected), "{src}");
        }
    }

    #[test]
    fn test_every_unit() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_chained_units() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("4m15s"), Ok(Duration::from_secs(255)));
        assert_eq!(parse_duration("2s250ms"), Ok(Duration::from_millis(2250)));
    }

    #[test]
    fn test_bare_number_and_spacing() {
        assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("  20s\n"), Ok(Duration::from_secs(20)));
        assert_eq!(parse_duration("20 s"), Ok(Duration::from_secs(20)));
    }

    #[test]
    fn test_rejects_garbage() {
        for src in ["", "   ", "soon", "-30s", "1d", "1h30", "ms", ".s", "1.2.3s", "."] {
            assert!(parse_duration(src).is_err(), "{src:?} should not parse");
        }
    }

    #[test]
    fn test_fractions() {
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2.5m"), Ok(Duration::from_secs(150)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1.000000001s"), Ok(Duration::new(1, 1)));
        assert_eq!(parse_duration("1h0.5m"), Ok(Duration::from_secs(3630)));
    }

    #[test]
    fn test_sub_millisecond_units() {
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("250\u{b5}s"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("250\u{3bc}s"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("750ns"), Ok(Duration::from_nanos(750)));
        assert_eq!(parse_duration("1ms500us"), Ok(Duration::from_micros(1500)));
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
        for src in [
            "6000000000000000h",
            "18446744073709551616s",
            "18446744073709551615s1s",
            "999999999999999999999999999999999999999999h",
        ] {
            assert!(parse_duration(src).is_err(), "{src:?} should not parse");
        }
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or_default("scanInterval", "1m"), Duration::from_secs(60));
        assert_eq!(parse_or_default("scanInterval", "quickly"), FALLBACK_DURATION);
        assert_eq!(parse_or_default("staleThreshold", ""), FALLBACK_DURATION);
        assert_eq!(
            parse_or_default("metrics.staleThreshold", "6000000000000000h"),
            FALLBACK_DURATION
        );
        assert_eq!(
            parse_or_default("metrics.staleThreshold", "2.5m"),
            Duration::from_secs(150)
        );
    }
}

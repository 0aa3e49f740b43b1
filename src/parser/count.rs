use crate::error::{Error, Result};

/// Multipliers the platform's listen counters use for abbreviated
/// magnitudes.
const MULTIPLIERS: &[(&str, f64)] = &[("万", 1_000.0), ("亿", 10_000_000.0)];

/// Normalize a textual count like `1.2万` or `3亿` to an integer. Plain
/// integers pass through; an unrecognized suffix is an error, never a
/// silent zero.
pub fn parse_count(raw: &str) -> Result<i64> {
    let text = raw.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Ok(n);
    }
    for (suffix, multiplier) in MULTIPLIERS {
        if let Some(number) = text.strip_suffix(suffix) {
            let value: f64 = number
                .trim()
                .parse()
                .map_err(|_| Error::parse(format!("bad count '{raw}'")))?;
            return Ok((value * multiplier).round() as i64);
        }
    }
    Err(Error::parse(format!("unrecognized count suffix in '{raw}'")))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integers_pass_through() {
        assert_eq!(parse_count("45").unwrap(), 45);
        assert_eq!(parse_count(" 45 ").unwrap(), 45);
        assert_eq!(parse_count("0").unwrap(), 0);
    }

    #[test]
    fn abbreviated_magnitudes_expand() {
        assert_eq!(parse_count("1.2万").unwrap(), 1200);
        assert_eq!(parse_count("3亿").unwrap(), 30_000_000);
        assert_eq!(parse_count("876万").unwrap(), 876_000);
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        assert!(parse_count("12k").is_err());
        assert!(parse_count("many").is_err());
        assert!(parse_count("").is_err());
        assert!(parse_count("万").is_err());
    }
}

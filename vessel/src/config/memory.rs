//! Memory-string parsing (§4.1). Used both for `--memory` (result kept in
//! mebibytes, then converted to bytes by the caller) and for tmpfs `size=`
//! (result multiplied by 1_048_576 with checked overflow — see the open
//! question in §9 about the resulting "mebibytes of mebibytes" unit, which
//! this crate preserves rather than silently fixing).

use vessel_shared::{Error, Result};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Parses a human-readable size (decimal with an optional unit suffix) and
/// returns an integer count of mebibytes. Accepts a bare integer (assumed
/// mebibytes already) or `<number><unit>` where unit is one of
/// `b`, `k`/`kb`, `m`/`mb`, `g`/`gb` (case-insensitive).
pub fn parse_memory_mib(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument("empty memory value"));
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number_part, unit_part) = trimmed.split_at(split_at);

    let value: f64 = number_part
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid memory value: {input}")))?;

    let unit = unit_part.trim().to_ascii_lowercase();
    let mib = match unit.as_str() {
        "" | "m" | "mb" | "mib" => value,
        "b" => value / BYTES_PER_MIB as f64,
        "k" | "kb" | "kib" => value / 1024.0,
        "g" | "gb" | "gib" => value * 1024.0,
        other => {
            return Err(Error::invalid_argument(format!(
                "unknown memory unit: {other}"
            )));
        }
    };

    if mib < 0.0 || !mib.is_finite() {
        return Err(Error::invalid_argument(format!(
            "invalid memory value: {input}"
        )));
    }

    Ok(mib.round() as u64)
}

/// Parses a memory string and converts the mebibyte count to bytes, failing
/// with `InvalidArgument` ("overflow") rather than wrapping on overflow.
/// This is the checked-overflow path §4.1 and §8 scenario 2/3 require.
///
/// The multiplication is carried out in `i128` and bounded against
/// `i64::MAX` rather than `u64::MAX`: the original implementation stores
/// this value in a signed 64-bit integer, so a mebibyte count that is
/// representable in `u64` but would overflow that signed range (as §8
/// scenario 3's `size=9999999999999` does) must still be rejected.
pub fn parse_memory_bytes(input: &str) -> Result<u64> {
    let mib = parse_memory_mib(input)?;
    let bytes = mib as i128 * BYTES_PER_MIB as i128;
    if bytes > i64::MAX as i128 {
        return Err(Error::invalid_argument(format!("memory value overflows: {input}")));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_number_as_mebibytes() {
        assert_eq!(parse_memory_mib("512").unwrap(), 512);
    }

    #[test]
    fn parses_explicit_unit() {
        assert_eq!(parse_memory_mib("2g").unwrap(), 2048);
        assert_eq!(parse_memory_mib("2GB").unwrap(), 2048);
        assert_eq!(parse_memory_mib("1024k").unwrap(), 1);
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(parse_memory_mib("not-a-number").is_err());
        assert!(parse_memory_mib("").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_memory_mib("5tb").is_err());
    }

    #[test]
    fn bytes_conversion_checks_overflow() {
        // scenario 2: size=64 -> 64 * 1048576 = 67108864
        assert_eq!(parse_memory_bytes("64").unwrap(), 64 * 1024 * 1024);
        // scenario 3: 9999999999999 * 1_048_576 exceeds i64::MAX, even
        // though it still fits in a u64.
        assert!(parse_memory_bytes("9999999999999").is_err());
    }
}

//! Byte-size strings ("2G", "500MiB") and human-readable byte counts

use crate::error::{AppError, Result};
use regex::Regex;
use std::sync::OnceLock;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

fn size_regex() -> &'static Regex {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    SIZE_RE.get_or_init(|| Regex::new(r"(?i)^\s*([\d.]+)\s*([a-z]*)\s*$").expect("size pattern compiles"))
}

/// Parse a size string into bytes.
///
/// `k`/`kb`, `m`/`mb`, `g`/`gb` and `t`/`tb` are decimal; `kib`, `mib`,
/// `gib` and `tib` are binary. A bare number is bytes. Fractions are
/// truncated after scaling.
pub fn parse_size(input: &str) -> Result<u64> {
    let captures = size_regex()
        .captures(input)
        .ok_or_else(|| AppError::parse(format!("cannot parse size {:?}", input)))?;

    let number: f64 = captures[1].parse()?;
    let unit = captures[2].to_lowercase();

    let multiplier: u64 = match unit.as_str() {
        "" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "kib" => KIB,
        "mib" => MIB,
        "gib" => GIB,
        "tib" => 1 << 40,
        other => return Err(AppError::parse(format!("unknown unit {:?}", other))),
    };

    Ok((number * multiplier as f64) as u64)
}

/// Format a byte count with binary units
pub fn human_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.0} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_valid() {
        let cases = [
            ("0", 0),
            ("1024", 1024),
            ("2G", 2_000_000_000),
            ("2g", 2_000_000_000),
            ("500MB", 500_000_000),
            ("1GiB", 1 << 30),
            ("10K", 10_000),
            (" 1.5 mib ", 1_572_864),
            ("1T", 1_000_000_000_000),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_size(input).unwrap(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_size_invalid() {
        for input in ["", "abc", "2X", "-5G", "1.2.3G"] {
            assert!(parse_size(input).is_err(), "input {:?} should fail", input);
        }
    }

    #[test]
    fn test_malformed_number_reports_parse_error() {
        let error = parse_size("1.2.3M").unwrap_err();
        assert_eq!(error.category(), "PARSE");
        assert!(error.to_string().contains("invalid number"), "{}", error);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1 KiB");
        assert_eq!(human_bytes(1_048_576), "1.0 MiB");
        assert_eq!(human_bytes(1_073_741_824), "1.00 GiB");
        assert_eq!(human_bytes(3 * 1_073_741_824 / 2), "1.50 GiB");
    }
}

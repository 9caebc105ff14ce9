use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};

/// Megabytes per gigabyte in the size-class convention.
pub const MB_PER_GB: u32 = 1024;

static DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)x([0-9]+)$").unwrap_or_else(|e| panic!("size regex: {e}"))
});

/// Per-node resource allocation, written compactly as `<CPU>x<MEMORY-GB>`
/// (e.g. `4x8` is 4 cores and 8192 MB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeClass {
    pub cpu: u32,
    pub memory_mb: u32,
}

impl SizeClass {
    pub fn new(cpu: u32, memory_mb: u32) -> Self {
        Self { cpu, memory_mb }
    }

    /// Memory in whole gigabytes, rounded down.
    pub fn memory_gb(&self) -> u32 {
        self.memory_mb / MB_PER_GB
    }
}

/// Parse a `<CPU>x<MEMORY-GB>` descriptor.
///
/// Both numbers must be positive and written without leading zeros, so that
/// `format(parse(d)) == d` holds for every accepted descriptor.
pub fn parse(descriptor: &str) -> Result<SizeClass> {
    let invalid = |reason: &str| SiteError::InvalidSizeClass {
        descriptor: descriptor.to_string(),
        reason: reason.to_string(),
    };

    let caps = DESCRIPTOR
        .captures(descriptor)
        .ok_or_else(|| invalid("expected <CPU>x<MEMORY-GB>, e.g. 4x8"))?;
    let (cpu_str, mem_str) = (&caps[1], &caps[2]);

    if cpu_str.starts_with('0') || mem_str.starts_with('0') {
        return Err(invalid("values must be positive and have no leading zeros"));
    }

    let cpu: u32 = cpu_str.parse().map_err(|_| invalid("CPU count out of range"))?;
    let memory_gb: u32 = mem_str.parse().map_err(|_| invalid("memory out of range"))?;
    let memory_mb = memory_gb
        .checked_mul(MB_PER_GB)
        .ok_or_else(|| invalid("memory out of range"))?;

    Ok(SizeClass { cpu, memory_mb })
}

/// Render the canonical descriptor used for label stamping.
pub fn format(size: &SizeClass) -> String {
    format!("{}x{}", size.cpu, size.memory_gb())
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}

impl FromStr for SizeClass {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl TryFrom<String> for SizeClass {
    type Error = SiteError;

    fn try_from(s: String) -> Result<Self> {
        parse(&s)
    }
}

impl From<SizeClass> for String {
    fn from(size: SizeClass) -> Self {
        format(&size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let s = parse("4x8").unwrap();
        assert_eq!(s.cpu, 4);
        assert_eq!(s.memory_mb, 8192);
    }

    #[test]
    fn test_parse_converts_gb_to_mb() {
        assert_eq!(parse("2x4").unwrap().memory_mb, 4096);
        assert_eq!(parse("16x64").unwrap().memory_mb, 65536);
        assert_eq!(parse("1x1").unwrap().memory_mb, 1024);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for bad in [
            "", "4", "x8", "4x", "4X8", "4x8x2", " 4x8", "4x8 ", "a4x8", "4.5x8", "-4x8", "4x8GB",
            "٤x8",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, SiteError::InvalidSizeClass { .. }),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_rejects_zero_and_leading_zeros() {
        assert!(parse("0x8").is_err());
        assert!(parse("4x0").is_err());
        assert!(parse("04x8").is_err());
        assert!(parse("4x08").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse("99999999999x8").is_err());
        // 4194304 GB * 1024 overflows u32 megabytes
        assert!(parse("4x4194304").is_err());
    }

    #[test]
    fn test_format_roundtrip_descriptors() {
        for d in ["1x1", "2x4", "4x8", "8x32", "12x48", "128x1024"] {
            assert_eq!(format(&parse(d).unwrap()), d);
        }
    }

    #[test]
    fn test_parse_roundtrip_sizes() {
        for (cpu, gb) in [(1, 2), (3, 6), (32, 256)] {
            let s = SizeClass::new(cpu, gb * MB_PER_GB);
            assert_eq!(parse(&format(&s)).unwrap(), s);
        }
    }

    #[test]
    fn test_serde_as_descriptor_string() {
        let s = parse("2x4").unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"2x4\"");
        let back: SizeClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(serde_json::from_str::<SizeClass>("\"2by4\"").is_err());
    }

    #[test]
    fn test_from_str_and_display() {
        let s: SizeClass = "6x12".parse().unwrap();
        assert_eq!(s.to_string(), "6x12");
    }
}

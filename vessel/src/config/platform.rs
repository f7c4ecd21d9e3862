//! Platform string parsing (§4.1). `Platform::resolve` implements the
//! "string form wins when both are supplied" precedence rule.

use super::types::Platform;
use vessel_shared::{Error, Result};

impl Platform {
    /// Builds a platform from an explicit os/arch pair, with no variant.
    pub fn from_parts(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// Parses a slash-separated `os/arch[/variant]` string.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [os, arch] if !os.is_empty() && !arch.is_empty() => Ok(Platform {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: None,
            }),
            [os, arch, variant] if !os.is_empty() && !arch.is_empty() && !variant.is_empty() => {
                Ok(Platform {
                    os: os.to_string(),
                    architecture: arch.to_string(),
                    variant: Some(variant.to_string()),
                })
            }
            _ => Err(Error::invalid_argument(format!(
                "invalid platform string: {s}"
            ))),
        }
    }

    /// Resolves a platform from the `--os`/`--arch` flag pair and an
    /// optional `--platform OS/ARCH[/V]` string. If both forms are
    /// supplied, the string form wins (§4.1).
    pub fn resolve(os: &str, arch: &str, platform_string: Option<&str>) -> Result<Self> {
        match platform_string {
            Some(s) if !s.is_empty() => Platform::parse(s),
            _ => Ok(Platform::from_parts(os, arch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_os_arch() {
        let p = Platform::parse("linux/arm64").unwrap();
        assert_eq!(p.os, "linux");
        assert_eq!(p.architecture, "arm64");
        assert_eq!(p.variant, None);
    }

    #[test]
    fn parses_os_arch_variant() {
        let p = Platform::parse("linux/arm/v7").unwrap();
        assert_eq!(p.variant.as_deref(), Some("v7"));
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(Platform::parse("linux").is_err());
        assert!(Platform::parse("linux//").is_err());
        assert!(Platform::parse("").is_err());
    }

    #[test]
    fn string_form_wins_over_explicit_parts() {
        let p = Platform::resolve("darwin", "amd64", Some("linux/arm64")).unwrap();
        assert_eq!(p.os, "linux");
        assert_eq!(p.architecture, "arm64");
    }

    #[test]
    fn falls_back_to_explicit_parts_when_no_string() {
        let p = Platform::resolve("linux", "amd64", None).unwrap();
        assert_eq!(p.os, "linux");
        assert_eq!(p.architecture, "amd64");
    }
}

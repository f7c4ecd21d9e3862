//! DNS configuration assembly (C5 stage 8) and domain-name validation (§6).

use std::sync::OnceLock;

use regex::Regex;

use super::types::DnsConfig;
use vessel_shared::Result;

/// CLI DNS flags (§6).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DnsFlags {
    pub disabled: bool,
    pub nameservers: Vec<String>,
    pub search_domains: Vec<String>,
    pub options: Vec<String>,
    pub domain: Option<String>,
}

/// Builds the configuration's DNS section: `None` when disabled, otherwise
/// nameservers/search-domains/options/domain combined verbatim (§4.5 stage 8).
pub fn assemble_dns(flags: &DnsFlags) -> Result<Option<DnsConfig>> {
    if flags.disabled {
        return Ok(None);
    }

    if let Some(domain) = &flags.domain {
        if !domain.is_empty() && !is_valid_domain_name(domain) {
            return Err(vessel_shared::Error::invalid_argument(format!(
                "invalid dns domain: {domain}"
            )));
        }
    }

    Ok(Some(DnsConfig {
        nameservers: flags.nameservers.clone(),
        search_domains: flags.search_domains.clone(),
        options: flags.options.clone(),
        domain: flags.domain.clone(),
    }))
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("static regex"))
}

/// Validates a domain name per §6: non-empty, at most 255 octets total,
/// each label non-empty, at most 63 octets, matching
/// `[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?`. Case-insensitive on
/// labels; the input is returned unmodified to storage by callers (the
/// validator itself does not normalize case).
pub fn is_valid_domain_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return false;
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if !label_re().is_match(label) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_yields_none() {
        let flags = DnsFlags {
            disabled: true,
            ..Default::default()
        };
        assert_eq!(assemble_dns(&flags).unwrap(), None);
    }

    #[test]
    fn combines_fields() {
        let flags = DnsFlags {
            nameservers: vec!["1.1.1.1".to_string()],
            search_domains: vec!["example.internal".to_string()],
            options: vec!["ndots:1".to_string()],
            domain: Some("example.internal".to_string()),
            disabled: false,
        };
        let dns = assemble_dns(&flags).unwrap().unwrap();
        assert_eq!(dns.nameservers, vec!["1.1.1.1".to_string()]);
        assert_eq!(dns.domain.as_deref(), Some("example.internal"));
    }

    #[test]
    fn domain_validation_rules() {
        assert!(is_valid_domain_name("example.internal"));
        assert!(is_valid_domain_name("c1.example.internal."));
        assert!(!is_valid_domain_name(""));
        assert!(!is_valid_domain_name("-bad.com"));
        assert!(!is_valid_domain_name(&"a".repeat(64)));
        assert!(!is_valid_domain_name(&format!("{}.com", "a".repeat(256))));
    }

    #[test]
    fn case_insensitive_but_preserves_input() {
        assert!(is_valid_domain_name("Example.COM"));
    }
}

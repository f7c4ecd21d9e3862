//! Label parsing (§4.1). Each `--label` entry is split at most twice on
//! `=`; duplicate keys overwrite (last wins), matching `HashMap::insert`'s
//! natural semantics when entries are applied in flag order.

use std::collections::HashMap;
use vessel_shared::{Error, Result};

pub fn parse_labels(entries: &[String]) -> Result<HashMap<String, String>> {
    let mut labels = HashMap::new();
    for entry in entries {
        if entry.is_empty() {
            return Err(Error::invalid_argument("empty label entry"));
        }
        let mut parts = entry.splitn(2, '=');
        let key = parts.next().unwrap_or("").to_string();
        if key.is_empty() {
            return Err(Error::invalid_argument(format!("empty label key: {entry}")));
        }
        let value = parts.next().unwrap_or("").to_string();
        labels.insert(key, value);
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        let labels = parse_labels(&["a=1".to_string(), "b=2".to_string()]).unwrap();
        assert_eq!(labels.get("a"), Some(&"1".to_string()));
        assert_eq!(labels.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn missing_value_becomes_empty_string() {
        let labels = parse_labels(&["flag".to_string()]).unwrap();
        assert_eq!(labels.get("flag"), Some(&"".to_string()));
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let labels = parse_labels(&["a=1".to_string(), "a=2".to_string()]).unwrap();
        assert_eq!(labels.get("a"), Some(&"2".to_string()));
    }

    #[test]
    fn empty_entry_is_invalid_argument() {
        assert!(parse_labels(&["".to_string()]).is_err());
    }

    #[test]
    fn value_may_contain_equals() {
        let labels = parse_labels(&["a=1=2".to_string()]).unwrap();
        assert_eq!(labels.get("a"), Some(&"1=2".to_string()));
    }
}

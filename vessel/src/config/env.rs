//! Environment merging (§4.1, §8 scenario 8). Order is always
//! `image env ∘ env-files (in order) ∘ CLI env`, and is load-bearing:
//! later entries are not deduplicated against earlier ones by this
//! function — that's the container runtime's concern, not the parser's.

use std::collections::HashMap;
use vessel_shared::{Error, Result};

/// Parses the contents of a single `--env-file`. Lines are trimmed; blank
/// or `#`-prefixed lines are skipped; `K=V` with an empty key or empty
/// value is skipped; at most two splits on `=` (so values may contain
/// `=`).
pub fn parse_env_file(contents: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next();
        match value {
            Some(v) if !key.is_empty() && !v.is_empty() => {
                out.push(format!("{key}={v}"));
            }
            _ => continue,
        }
    }
    out
}

/// Resolves a single `--env` flag entry. Entries of the form `KEY=VALUE`
/// pass through unchanged. Entries of the form `KEY` (no `=`) are looked
/// up in `process_env`; missing keys are silently dropped (§9 open
/// question: no warning is emitted).
pub fn resolve_cli_env_entry(entry: &str, process_env: &HashMap<String, String>) -> Option<String> {
    if entry.contains('=') {
        Some(entry.to_string())
    } else {
        process_env.get(entry).map(|v| format!("{entry}={v}"))
    }
}

/// Merges image env, env-file contents (in file order), and CLI env flags
/// into the final ordered list handed to the process configuration.
///
/// `env_file_paths` are host filesystem paths (as supplied to
/// `--env-file`), read in order; a missing file is `NotFound` (§7 "missing
/// env file"), not silently skipped.
pub fn merge_env(
    image_env: &[String],
    env_file_paths: &[String],
    cli_env: &[String],
    process_env: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let mut merged = Vec::new();
    merged.extend(image_env.iter().cloned());

    for path in env_file_paths {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| Error::not_found(format!("env file not found: {path}")))?;
        merged.extend(parse_env_file(&contents));
    }

    for entry in cli_env {
        if entry.is_empty() {
            return Err(Error::invalid_argument("empty env entry"));
        }
        if let Some(resolved) = resolve_cli_env_entry(entry, process_env) {
            merged.push(resolved);
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_skips_comments_blanks_and_invalid_entries() {
        // §8 scenario 8
        let contents = "FOO=bar\n# comment\n\n=novalue\nNOKEY=\n";
        let parsed = parse_env_file(contents);
        assert_eq!(parsed, vec!["FOO=bar".to_string()]);
    }

    #[test]
    fn env_file_allows_equals_in_value() {
        let parsed = parse_env_file("KEY=a=b=c");
        assert_eq!(parsed, vec!["KEY=a=b=c".to_string()]);
    }

    #[test]
    fn cli_entry_without_equals_looks_up_process_env() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/root".to_string());
        assert_eq!(
            resolve_cli_env_entry("HOME", &env),
            Some("HOME=/root".to_string())
        );
        assert_eq!(resolve_cli_env_entry("MISSING", &env), None);
    }

    #[test]
    fn merge_preserves_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("env");
        std::fs::write(&path, "B=2\n").unwrap();

        let image_env = vec!["A=1".to_string()];
        let env_files = vec![path.to_string_lossy().into_owned()];
        let cli_env = vec!["C=3".to_string()];
        let merged = merge_env(&image_env, &env_files, &cli_env, &HashMap::new()).unwrap();
        assert_eq!(merged, vec!["A=1", "B=2", "C=3"]);
    }

    #[test]
    fn merge_drops_missing_cli_lookup_silently() {
        let merged = merge_env(&[], &[], &["MISSING".to_string()], &HashMap::new()).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_fails_not_found_for_missing_env_file() {
        let err = merge_env(&[], &["/nonexistent/path/to/env".to_string()], &[], &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

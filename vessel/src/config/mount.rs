//! Mount/volume mini-parser (C2, §4.2). Three surfaces feed the same
//! [`ParsedMount`] output: `--mount` directive strings, `--volume` positional
//! strings, and `--tmpfs` destination lists.
//!
//! Named-volume references are left unresolved here (as [`ParsedVolume`]) and
//! joined against the volume service's inventory later, in the pipeline (C5
//! stage 6) — this module never talks to the volume service.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use std::sync::OnceLock;

use super::memory::parse_memory_bytes;
use super::types::{FilesystemMount, MountType, ParsedVolume};
use vessel_shared::{Error, Result};

/// `[A-Za-z0-9][A-Za-z0-9_.-]+` — an identifier-like name for a named
/// volume (§6, "Volume name pattern").
fn volume_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]+$").expect("static regex"))
}

fn is_valid_volume_name(name: &str) -> bool {
    volume_name_re().is_match(name)
}

/// Either a fully resolved filesystem mount or an unresolved named-volume
/// reference awaiting resolution against the volume service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMount {
    Filesystem(FilesystemMount),
    Volume(ParsedVolume),
}

/// Parses a single `--mount type=...,source=...,destination=...[,ro][,size=...][,mode=...]`
/// directive string (§4.2, §6 "Mount directive grammar").
///
/// Directives are comma-separated `key=value` pairs, plus the bare boolean
/// `ro`/`readonly` (no value). Unknown keys are rejected. `type` defaults to
/// `virtiofs` when omitted.
pub fn parse_mount_directive(directive: &str) -> Result<ParsedMount> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut readonly = false;

    for part in directive.split(',') {
        if part.is_empty() {
            continue;
        }
        // At most two splits: mount option values may themselves contain
        // `=` (§9 open question, resolved in DESIGN.md).
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        let value = kv.next();

        let canonical_key = match key {
            "type" => "type",
            "source" | "src" => "source",
            "destination" | "dst" | "target" => "destination",
            "ro" | "readonly" => "ro",
            "size" => "size",
            "mode" => "mode",
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown mount directive key: {other}"
                )));
            }
        };

        if canonical_key == "ro" {
            readonly = true;
            continue;
        }

        let value = value.ok_or_else(|| {
            Error::invalid_argument(format!("mount directive key '{key}' requires a value"))
        })?;
        fields.insert(canonical_key.to_string(), value.to_string());
    }

    let kind = match fields.get("type").map(String::as_str) {
        None | Some("virtiofs") | Some("bind") => MountType::Virtiofs,
        Some("tmpfs") => MountType::Tmpfs,
        Some("volume") => MountType::Volume,
        Some(other) => {
            return Err(Error::invalid_argument(format!(
                "unknown mount type: {other}"
            )));
        }
    };

    let destination = fields
        .get("destination")
        .cloned()
        .unwrap_or_default();

    let mut options = Vec::new();
    if readonly {
        options.push("ro".to_string());
    }

    if kind != MountType::Tmpfs {
        if fields.contains_key("size") || fields.contains_key("mode") {
            return Err(Error::invalid_argument(
                "size/mode are only valid for type=tmpfs",
            ));
        }
    } else {
        if let Some(size) = fields.get("size") {
            let bytes = parse_memory_bytes(size)?;
            options.push(format!("size={bytes}"));
        }
        if let Some(mode) = fields.get("mode") {
            options.push(format!("mode={mode}"));
        }
    }

    match kind {
        MountType::Volume => {
            let name = fields.get("source").cloned().unwrap_or_default();
            if !is_valid_volume_name(&name) {
                return Err(Error::invalid_argument(format!(
                    "invalid volume name: {name}"
                )));
            }
            Ok(ParsedMount::Volume(ParsedVolume {
                name,
                destination,
                options,
            }))
        }
        MountType::Tmpfs => {
            if fields.contains_key("source") {
                return Err(Error::invalid_argument("tmpfs mounts cannot have a source"));
            }
            Ok(ParsedMount::Filesystem(FilesystemMount {
                source: String::new(),
                destination,
                kind,
                options,
            }))
        }
        MountType::Virtiofs => {
            let source = fields.get("source").cloned().unwrap_or_default();
            let source = resolve_host_source(&source)?;
            Ok(ParsedMount::Filesystem(FilesystemMount {
                source,
                destination,
                kind,
                options,
            }))
        }
    }
}

fn resolve_host_source(source: &str) -> Result<String> {
    let path = Path::new(source);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(Error::from)?
            .join(path)
    };
    Ok(absolute.to_string_lossy().into_owned())
}

/// Parses a `--volume src:dst[:opt,opt]` positional string (§4.2).
///
/// `src` beginning with `/` is a host-path bind; otherwise it is a named
/// volume reference. Leading colons are trimmed; a single part (no `:`) is
/// rejected since anonymous volumes aren't supported.
pub fn parse_volume_flag(entry: &str) -> Result<ParsedMount> {
    let trimmed = entry.trim_start_matches(':');
    let parts: Vec<&str> = trimmed.split(':').collect();

    if parts.len() < 2 {
        return Err(Error::invalid_argument(
            "anonymous volumes not supported: expected src:dst",
        ));
    }

    let src = parts[0];
    let dst = parts[1];
    let options: Vec<String> = parts
        .get(2)
        .map(|opts| opts.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    if src.starts_with('/') {
        let source = resolve_host_source(src)?;
        Ok(ParsedMount::Filesystem(FilesystemMount {
            source,
            destination: dst.to_string(),
            kind: MountType::Virtiofs,
            options,
        }))
    } else {
        if !is_valid_volume_name(src) {
            return Err(Error::invalid_argument(format!(
                "invalid volume name: {src}"
            )));
        }
        Ok(ParsedMount::Volume(ParsedVolume {
            name: src.to_string(),
            destination: dst.to_string(),
            options,
        }))
    }
}

/// Parses a `--tmpfs` list: each destination becomes a tmpfs mount with no
/// options. Duplicate raw entries are de-duplicated (string equality over
/// the raw flag text, per §9) before parsing.
pub fn parse_tmpfs_list(entries: &[String]) -> Result<Vec<FilesystemMount>> {
    let mut seen = HashSet::new();
    let mut mounts = Vec::new();
    for destination in entries {
        if !seen.insert(destination.clone()) {
            continue;
        }
        if destination.is_empty() {
            return Err(Error::invalid_argument("tmpfs destination must not be empty"));
        }
        mounts.push(FilesystemMount {
            source: String::new(),
            destination: destination.clone(),
            kind: MountType::Tmpfs,
            options: Vec::new(),
        });
    }
    Ok(mounts)
}

/// Validates a single already-parsed filesystem mount (§4.2 "Validation",
/// §8 invariants). Named volumes are not validated here: source-existence
/// checks are deferred to resolution against the volume service.
pub fn validate_filesystem_mount(mount: &FilesystemMount) -> Result<()> {
    if mount.destination.is_empty() {
        return Err(Error::invalid_argument("mount destination must not be empty"));
    }

    if mount.kind != MountType::Tmpfs {
        let path = Path::new(&mount.source);
        if !path.is_absolute() {
            return Err(Error::invalid_argument(format!(
                "mount source must be an absolute path: {}",
                mount.source
            )));
        }
        if !path.is_dir() {
            return Err(Error::not_found(format!(
                "mount source does not exist or is not a directory: {}",
                mount.source
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tmpfs_directive_with_size_and_mode() {
        // §8 scenario 2
        let parsed =
            parse_mount_directive("type=tmpfs,destination=/tmp,size=64,mode=1777").unwrap();
        match parsed {
            ParsedMount::Filesystem(m) => {
                assert_eq!(m.kind, MountType::Tmpfs);
                assert_eq!(m.destination, "/tmp");
                assert!(m.options.contains(&"size=67108864".to_string()));
                assert!(m.options.contains(&"mode=1777".to_string()));
            }
            _ => panic!("expected filesystem mount"),
        }
    }

    #[test]
    fn tmpfs_size_overflow_is_rejected() {
        // §8 scenario 3
        let err = parse_mount_directive("type=tmpfs,destination=/tmp,size=9999999999999")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn size_on_non_tmpfs_is_rejected() {
        let temp = TempDir::new().unwrap();
        let directive = format!(
            "type=virtiofs,source={},destination=/data,size=64",
            temp.path().display()
        );
        assert!(parse_mount_directive(&directive).is_err());
    }

    #[test]
    fn tmpfs_forbids_source() {
        assert!(parse_mount_directive("type=tmpfs,destination=/tmp,source=/x").is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(parse_mount_directive("type=tmpfs,destination=/tmp,bogus=1").is_err());
    }

    #[test]
    fn volume_directive_validates_name() {
        let parsed = parse_mount_directive("type=volume,source=myvol,destination=/data").unwrap();
        assert_eq!(
            parsed,
            ParsedMount::Volume(ParsedVolume {
                name: "myvol".to_string(),
                destination: "/data".to_string(),
                options: Vec::new(),
            })
        );

        assert!(parse_mount_directive("type=volume,source=!!bad,destination=/data").is_err());
    }

    #[test]
    fn volume_flag_host_bind() {
        // §8 scenario 1
        let temp = TempDir::new().unwrap();
        let entry = format!("{}:/data:ro", temp.path().display());
        let parsed = parse_volume_flag(&entry).unwrap();
        match parsed {
            ParsedMount::Filesystem(m) => {
                assert_eq!(m.kind, MountType::Virtiofs);
                assert_eq!(m.destination, "/data");
                assert_eq!(m.options, vec!["ro".to_string()]);
            }
            _ => panic!("expected filesystem mount"),
        }
    }

    #[test]
    fn volume_flag_named_volume() {
        let parsed = parse_volume_flag("myvol:/data").unwrap();
        assert_eq!(
            parsed,
            ParsedMount::Volume(ParsedVolume {
                name: "myvol".to_string(),
                destination: "/data".to_string(),
                options: Vec::new(),
            })
        );
    }

    #[test]
    fn volume_flag_rejects_anonymous() {
        assert!(parse_volume_flag("/data").is_err());
    }

    #[test]
    fn tmpfs_list_dedups_raw_entries() {
        let mounts =
            parse_tmpfs_list(&["/tmp".to_string(), "/tmp".to_string(), "/var/run".to_string()])
                .unwrap();
        assert_eq!(mounts.len(), 2);
    }

    #[test]
    fn validate_rejects_missing_host_source() {
        let mount = FilesystemMount {
            source: "/definitely/does/not/exist/anywhere".to_string(),
            destination: "/data".to_string(),
            kind: MountType::Virtiofs,
            options: Vec::new(),
        };
        assert!(validate_filesystem_mount(&mount).is_err());
    }
}

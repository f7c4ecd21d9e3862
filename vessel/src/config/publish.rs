//! Port/socket publish parsers (C3, §4.3).
//!
//! `parse_socket` performs host filesystem mutations during parsing — a
//! documented hazard (§9): it is the one parser in this crate that is not
//! side-effect-light. See its doc comment before calling it outside the
//! pipeline's parse-then-validate sequencing.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use super::types::{Protocol, PublishPort, PublishSocket};
use vessel_shared::{Error, Result};

/// Parses `[host-ip:]host-port:container-port[/protocol]` (§4.3).
///
/// Protocol is split off first (`/`); absent protocol defaults to `tcp`.
/// The remaining address:port(s) are split on `:`: two parts give a default
/// host address of `0.0.0.0`, three parts give an explicit host address.
pub fn parse_port(spec: &str) -> Result<PublishPort> {
    let (address_and_ports, protocol_str) = match spec.split_once('/') {
        Some((rest, proto)) => (rest, proto),
        None => (spec, "tcp"),
    };

    let protocol = Protocol::parse(protocol_str)
        .ok_or_else(|| Error::invalid_argument(format!("unknown protocol: {protocol_str}")))?;

    let parts: Vec<&str> = address_and_ports.split(':').collect();
    let (host_address, host_port_str, container_port_str) = match parts.as_slice() {
        [host_port, container_port] => ("0.0.0.0", *host_port, *container_port),
        [address, host_port, container_port] => (*address, *host_port, *container_port),
        _ => {
            return Err(Error::invalid_argument(format!(
                "invalid publish-port specification: {spec}"
            )));
        }
    };

    let host_port: u16 = host_port_str
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid host port: {host_port_str}")))?;
    let container_port: u16 = container_port_str.parse().map_err(|_| {
        Error::invalid_argument(format!("invalid container port: {container_port_str}"))
    })?;

    Ok(PublishPort {
        host_address: host_address.to_string(),
        host_port,
        container_port,
        protocol,
    })
}

/// Parses `host_path:container_path` and prepares the host side of the
/// socket (§4.3).
///
/// This performs, in order, the side effects the spec requires at parse
/// time rather than at container start:
/// 1. if the host path exists and is already a socket, fails with
///    `Conflict` ("already exists and may be in use");
/// 2. if it exists and is not a socket, deletes it;
/// 3. creates any missing parent directories.
///
/// Deliberately coupled (§9 design note): splitting parse from preparation
/// would be a larger behavioural change than this crate's scope.
pub fn parse_socket(spec: &str) -> Result<PublishSocket> {
    let (host_part, container_part) = spec
        .split_once(':')
        .ok_or_else(|| Error::invalid_argument(format!("invalid publish-socket specification: {spec}")))?;

    if host_part.is_empty() || container_part.is_empty() {
        return Err(Error::invalid_argument(
            "publish-socket host and container paths must not be empty",
        ));
    }
    if !container_part.starts_with('/') {
        return Err(Error::invalid_argument(
            "publish-socket container path must be absolute",
        ));
    }

    let host_path = resolve_absolute(host_part)?;
    prepare_host_socket_path(&host_path)?;

    Ok(PublishSocket {
        container_path: container_part.to_string(),
        host_path,
        permissions: None,
    })
}

fn resolve_absolute(path: &str) -> Result<PathBuf> {
    let p = Path::new(path);
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir().map_err(Error::from)?.join(p))
    }
}

fn prepare_host_socket_path(host_path: &Path) -> Result<()> {
    match fs::symlink_metadata(host_path) {
        Ok(metadata) => {
            if metadata.file_type().is_socket() {
                return Err(Error::conflict(format!(
                    "publish-socket host path already exists and may be in use: {}",
                    host_path.display()
                )));
            }
            fs::remove_file(host_path).map_err(Error::from)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::from(e)),
    }

    if let Some(parent) = host_path.parent() {
        fs::create_dir_all(parent).map_err(Error::from)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn two_part_port_defaults_address_and_protocol() {
        let p = parse_port("8080:80").unwrap();
        assert_eq!(p.host_address, "0.0.0.0");
        assert_eq!(p.host_port, 8080);
        assert_eq!(p.container_port, 80);
        assert_eq!(p.protocol, Protocol::Tcp);
    }

    #[test]
    fn three_part_port_with_explicit_protocol() {
        // §8 scenario 4
        let p = parse_port("127.0.0.1:8080:80/udp").unwrap();
        assert_eq!(p.host_address, "127.0.0.1");
        assert_eq!(p.host_port, 8080);
        assert_eq!(p.container_port, 80);
        assert_eq!(p.protocol, Protocol::Udp);
    }

    #[test]
    fn rejects_unknown_protocol() {
        assert!(parse_port("8080:80/sctp").is_err());
    }

    #[test]
    fn rejects_malformed_shape() {
        assert!(parse_port("8080").is_err());
        assert!(parse_port("a:b:c:d").is_err());
    }

    #[test]
    fn socket_rejects_relative_container_path() {
        // §8 scenario 5
        let err = parse_socket("/tmp/x.sock:var/run/y.sock").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn socket_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let host_path = temp.path().join("nested").join("y.sock");
        let spec = format!("{}:/run/y.sock", host_path.display());
        let socket = parse_socket(&spec).unwrap();
        assert!(host_path.parent().unwrap().is_dir());
        assert_eq!(socket.container_path, "/run/y.sock");
    }

    #[test]
    fn socket_removes_non_socket_preexisting_file() {
        let temp = TempDir::new().unwrap();
        let host_path = temp.path().join("y.sock");
        std::fs::write(&host_path, b"not a socket").unwrap();
        let spec = format!("{}:/run/y.sock", host_path.display());
        parse_socket(&spec).unwrap();
        assert!(!host_path.exists());
    }

    #[test]
    fn socket_rejects_preexisting_socket() {
        let temp = TempDir::new().unwrap();
        let host_path = temp.path().join("y.sock");
        let listener = std::os::unix::net::UnixListener::bind(&host_path).unwrap();
        let spec = format!("{}:/run/y.sock", host_path.display());
        let err = parse_socket(&spec).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        drop(listener);
    }
}

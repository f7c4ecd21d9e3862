//! Concrete [`crate::config::pipeline::HostInfo`] implementation: shells
//! out to `sw_vers` for the host OS major version, the one fact this crate
//! cannot get from `std::env::consts` alone.

use crate::config::pipeline::HostInfo;

pub struct SystemHostInfo;

impl HostInfo for SystemHostInfo {
    fn architecture(&self) -> String {
        match std::env::consts::ARCH {
            "aarch64" => "arm64".to_string(),
            other => other.to_string(),
        }
    }

    fn os_major_version(&self) -> u32 {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|version| version.trim().split('.').next().map(str::to_string))
            .and_then(|major| major.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn architecture_never_empty() {
        assert!(!SystemHostInfo.architecture().is_empty());
    }
}

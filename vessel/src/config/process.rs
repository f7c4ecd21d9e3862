//! Process-configuration resolver (C4, §4.4). Merges image entrypoint/cmd/
//! env/user/workdir with CLI overrides into a launchable [`ProcessConfiguration`].

use std::collections::HashMap;

use super::env::merge_env;
use super::types::{ImageConfig, ProcessConfiguration};
use super::user::resolve_user;
use vessel_shared::{Error, Result};

/// Process-level CLI flags consumed by the resolver (§6 "Process flags").
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ProcessFlags {
    pub arguments: Vec<String>,
    pub cwd: Option<String>,
    pub env: Vec<String>,
    /// Host filesystem paths from `--env-file`, in flag order; read and
    /// parsed by [`merge_env`].
    pub env_files: Vec<String>,
    pub tty: bool,
    pub user: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Non-empty when the caller wants to override the image's entrypoint.
    pub entrypoint: Option<String>,
}

/// Resolves the launchable process spec (§4.4 algorithm).
///
/// Argument vector: entrypoint override (if any) replaces the image
/// entrypoint and discards the image's `cmd`; otherwise the image
/// entrypoint is used, with CLI positional arguments appended if given, or
/// the image's `cmd` appended if not. An empty resulting vector is a fatal
/// `InvalidArgument` ("Command/Entrypoint not specified").
pub fn resolve_process(
    flags: &ProcessFlags,
    image: &ImageConfig,
    process_env: &HashMap<String, String>,
) -> Result<ProcessConfiguration> {
    let entrypoint_overridden = flags
        .entrypoint
        .as_deref()
        .map(|e| !e.is_empty())
        .unwrap_or(false);

    let mut argv: Vec<String> = if entrypoint_overridden {
        vec![flags.entrypoint.clone().unwrap()]
    } else if !image.entrypoint.is_empty() {
        image.entrypoint.clone()
    } else {
        Vec::new()
    };

    if !flags.arguments.is_empty() {
        argv.extend(flags.arguments.iter().cloned());
    } else if !entrypoint_overridden {
        argv.extend(image.cmd.iter().cloned());
    }

    if argv.is_empty() {
        return Err(Error::invalid_argument("Command/Entrypoint not specified"));
    }

    let executable = argv[0].clone();

    let working_directory = flags
        .cwd
        .clone()
        .or_else(|| image.working_dir.clone())
        .unwrap_or_else(|| "/".to_string());

    let env = merge_env(&image.env, &flags.env_files, &flags.env, process_env)?;

    let (user, supplemental_groups) = resolve_user(
        flags.user.as_deref(),
        flags.uid,
        flags.gid,
        image.user.as_deref(),
    );

    Ok(ProcessConfiguration {
        executable,
        arguments: argv,
        env,
        working_directory,
        terminal: flags.tty,
        user,
        supplemental_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(entrypoint: &[&str], cmd: &[&str]) -> ImageConfig {
        ImageConfig {
            entrypoint: entrypoint.iter().map(|s| s.to_string()).collect(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            env: Vec::new(),
            user: None,
            working_dir: None,
        }
    }

    #[test]
    fn image_entrypoint_plus_cli_arguments() {
        // §8 scenario 6, first half
        let img = image(&["/app"], &["--help"]);
        let flags = ProcessFlags {
            arguments: vec!["serve".to_string()],
            ..Default::default()
        };
        let process = resolve_process(&flags, &img, &HashMap::new()).unwrap();
        assert_eq!(process.arguments, vec!["/app", "serve"]);
        assert_eq!(process.executable, "/app");
    }

    #[test]
    fn entrypoint_override_discards_image_cmd() {
        // §8 scenario 6, second half
        let img = image(&["/app"], &["--help"]);
        let flags = ProcessFlags {
            entrypoint: Some("/bin/sh".to_string()),
            ..Default::default()
        };
        let process = resolve_process(&flags, &img, &HashMap::new()).unwrap();
        assert_eq!(process.arguments, vec!["/bin/sh"]);
    }

    #[test]
    fn empty_result_is_invalid_argument() {
        let img = image(&[], &[]);
        let flags = ProcessFlags::default();
        assert!(resolve_process(&flags, &img, &HashMap::new()).is_err());
    }

    #[test]
    fn cwd_precedence() {
        let mut img = image(&["/app"], &[]);
        img.working_dir = Some("/srv".to_string());
        let flags = ProcessFlags::default();
        let process = resolve_process(&flags, &img, &HashMap::new()).unwrap();
        assert_eq!(process.working_directory, "/srv");

        let flags_with_cwd = ProcessFlags {
            cwd: Some("/home".to_string()),
            ..Default::default()
        };
        let process = resolve_process(&flags_with_cwd, &img, &HashMap::new()).unwrap();
        assert_eq!(process.working_directory, "/home");
    }

    #[test]
    fn defaults_to_root_working_directory() {
        let img = image(&["/app"], &[]);
        let process = resolve_process(&ProcessFlags::default(), &img, &HashMap::new()).unwrap();
        assert_eq!(process.working_directory, "/");
    }
}

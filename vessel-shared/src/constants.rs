//! Process-wide names: environment variables, default directories, network
//! listener addresses. Centralised so the daemon, CLI and tests agree on the
//! same literal strings.

/// Overrides the application data root. Default is the platform
/// application-support directory joined with [`APP_ROOT_DIR_NAME`].
pub const APP_ROOT_ENV: &str = "CONTAINER_APP_ROOT";

/// Default application root directory name, appended to the platform's
/// application-support directory when `CONTAINER_APP_ROOT` is unset.
pub const APP_ROOT_DIR_NAME: &str = "com.apple.container";

/// Subdirectory holding kernel binaries and `default.kernel-<arch>` symlinks.
pub const KERNELS_DIR: &str = "kernels";

/// Subdirectory holding persisted network service state.
pub const NETWORKS_DIR: &str = "networks";

/// Subdirectory holding persisted volume service state.
pub const VOLUMES_DIR: &str = "volumes";

/// Subdirectory holding daemon log files.
pub const LOGS_DIR: &str = "logs";

/// Subdirectory holding plugin resource directories.
pub const PLUGINS_DIR: &str = "plugins";

/// Subdirectory holding cached image layers, config blobs, and extracted
/// rootfs directories (content-addressed by digest).
pub const IMAGES_DIR: &str = "images";

/// SQLite database file name for daemon-owned persisted state.
pub const DB_FILE_NAME: &str = "vessel.db";

/// Name of the automatically created NAT-mode network.
pub const DEFAULT_NETWORK_NAME: &str = "default";

/// Embedded DNS server bind address (UDP and TCP).
pub const DNS_BIND_ADDR: &str = "127.0.0.1:2053";

/// Prefix prepended to a `default.kernel-<arch>` symlink name.
pub const DEFAULT_KERNEL_PREFIX: &str = "default.kernel-";

/// RPC server listener: a Unix domain socket under the app root, named
/// after the daemon's identifier (§6 "the daemon's identifier").
pub const RPC_SOCKET_NAME: &str = "vessel.sock";

/// Minimum host OS major version required to attach a container to a
/// non-default network (§4.5 stage 7). Below this, the pipeline rejects
/// non-default network requests with `InvalidArgument`.
pub const MIN_NON_DEFAULT_NETWORK_OS_MAJOR_VERSION: u32 = 13;

/// CPU architecture that triggers Rosetta emulation when the requested
/// platform architecture is `amd64` (§4.5 stage 9).
pub const EMULATION_HOST_ARCH: &str = "arm64";
pub const EMULATION_REQUEST_ARCH: &str = "amd64";

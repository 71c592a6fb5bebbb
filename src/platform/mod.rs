use std::path::{Path, PathBuf};

/// Per-OS filesystem conventions. Each OS provides its own `NativePlatform`
/// so call sites stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory for the build server.
    /// Unix: `~/.qmk-build-server`, Windows: `%APPDATA%\qmk-build-server`.
    fn data_dir() -> PathBuf;
}

/// `$QMK_BUILD_DATA_DIR` when set and non-empty, otherwise `default`.
pub fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var_os("QMK_BUILD_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;

use std::{
    env, io,
    path::{Path, PathBuf},
};

use anyhow::Result;

const APPLICATION_DIR: &str = "flextime";

/// Per-user directory holding measurements and logs. Shared by the daemon and the cli, so both
/// must agree on it.
pub fn create_application_default_path() -> Result<PathBuf> {
    let path = platform_state_dir().join(APPLICATION_DIR);

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// Application directory given with `--dir`, or the default one. A relative directory is resolved
/// against the current directory right away, as the daemon later changes into `/`.
pub fn resolve_application_path(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(std::path::absolute(dir)?),
        None => create_application_default_path(),
    }
}

/// Directory with chunk files inside an application directory.
pub fn measurements_dir(application_dir: &Path) -> PathBuf {
    application_dir.join("measurements")
}

#[cfg(windows)]
fn platform_state_dir() -> PathBuf {
    PathBuf::from(env::var("APPDATA").expect("APPDATA should be present on Windows"))
}

#[cfg(target_os = "macos")]
fn platform_state_dir() -> PathBuf {
    let mut path = PathBuf::from(env::var("HOME").expect("HOME should be present on macOS"));
    path.push("Library/Application Support");
    path
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_state_dir() -> PathBuf {
    env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|_| {
            env::var("HOME").map(|home| {
                let mut path = PathBuf::from(home);
                path.push(".local/state");
                path
            })
        })
        .expect("Couldn't find neither XDG_STATE_HOME nor HOME")
}

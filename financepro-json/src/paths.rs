use directories::BaseDirs;
use financepro_core::StoreError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const APP_DIR: &str = "financepro";
pub const DATA_FILE: &str = "data.json";
pub const CONFIG_FILE: &str = "config.json";
pub const BACKUPS_DIR: &str = "backups";

const SUPPORTED_OS: [&str; 3] = ["linux", "macos", "windows"];

/// File locations for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPaths {
    pub dir: PathBuf,
    pub data: PathBuf,
    pub config: PathBuf,
    pub backups: PathBuf,
}

impl UserPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            data: dir.join(DATA_FILE),
            config: dir.join(CONFIG_FILE),
            backups: dir.join(BACKUPS_DIR),
            dir,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Resolved {
    pub paths: UserPaths,
    /// `false` when the user has no `data.json` yet and needs bootstrapping.
    pub existed: bool,
}

/// `<platform data dir>/financepro`, e.g. `~/.local/share/financepro` on Linux.
pub fn data_root() -> Result<PathBuf, StoreError> {
    let os = std::env::consts::OS;
    if !SUPPORTED_OS.contains(&os) {
        return Err(StoreError::UnsupportedPlatform(os.to_string()));
    }
    let base = BaseDirs::new()
        .ok_or_else(|| StoreError::UnsupportedPlatform(format!("{os} without a home directory")))?;
    Ok(base.data_dir().join(APP_DIR))
}

pub fn resolve(username: &str) -> Result<Resolved, StoreError> {
    resolve_in(&data_root()?, username)
}

/// Like [`resolve`], with an explicit application root instead of the platform one.
pub fn resolve_in(root: &Path, username: &str) -> Result<Resolved, StoreError> {
    check_username(username)?;
    let paths = UserPaths::new(root.join(username));
    debug!("resolved user directory {}", paths.dir.display());

    let existed = if paths.dir.is_dir() {
        paths.data.is_file()
    } else {
        create_user_dir(&paths)?
    };
    Ok(Resolved { paths, existed })
}

/// Creates the user directory. Another process creating it first is not an
/// error; the user then counts as existing if its data file is already there.
pub(crate) fn create_user_dir(paths: &UserPaths) -> Result<bool, StoreError> {
    if let Some(parent) = paths.dir.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::persistence(parent, e))?;
    }
    match fs::create_dir(&paths.dir) {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existed = paths.data.is_file();
            warn!(
                "user directory {} was created concurrently (data file present: {existed})",
                paths.dir.display()
            );
            Ok(existed)
        }
        Err(e) => Err(StoreError::persistence(&paths.dir, e)),
    }
}

fn check_username(username: &str) -> Result<(), StoreError> {
    let bad = username.is_empty()
        || username == "."
        || username == ".."
        || username.trim() != username
        || username.chars().any(|c| matches!(c, '/' | '\\' | '\0' | ':'));
    if bad {
        return Err(StoreError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

use chrono::Utc;
use financepro_core::{
    decode_user_config, decode_user_data, format_size, EntryId, Expense, Session, StoreError,
    UserConfig, UserData,
};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

pub mod paths;

use paths::{Resolved, UserPaths};

pub const DEFAULT_MAX_BACKUPS: usize = 10;

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S%3f";

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Application root holding one directory per user. `None` uses the
    /// platform data directory.
    pub root: Option<PathBuf>,
    /// Number of timestamped `data.json` copies kept under `backups/`.
    pub max_backups: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            root: None,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl StoreOptions {
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    fn resolve(&self, username: &str) -> Result<Resolved, StoreError> {
        match &self.root {
            Some(root) => paths::resolve_in(root, username),
            None => paths::resolve(username),
        }
    }
}

/// One logged-in user's expense data: what is on disk, what was added this
/// session, and the merged view of both.
pub struct UserStore {
    paths: UserPaths,
    config: UserConfig,
    session: Session,
    max_backups: usize,
}

impl UserStore {
    pub fn open(username: &str, options: &StoreOptions) -> Result<Self, StoreError> {
        let resolved = options.resolve(username)?;
        let fresh = if resolved.existed {
            false
        } else {
            bootstrap(&resolved.paths, username)?
        };

        let boot = load_data(&resolved.paths.data)?;
        let mut config = load_config(&resolved.paths, username)?;
        // A freshly written config already counts this launch.
        if !fresh {
            config.launches += 1;
        }
        info!(
            "opened data for {username}: {} expenses, launch {}",
            boot.expenses.len(),
            config.launches
        );

        Ok(Self {
            paths: resolved.paths,
            config,
            session: Session::new(boot),
            max_backups: options.max_backups.max(1),
        })
    }

    /// Moves unreadable `data.json`/`config.json` files into `backups/` and
    /// opens the store on a fresh record.
    pub fn recover_corrupt(username: &str, options: &StoreOptions) -> Result<Self, StoreError> {
        let resolved = options.resolve(username)?;
        let p = &resolved.paths;
        if p.data.is_file() && read_file(&p.data).map(|b| decode_user_data(&b).is_err())? {
            quarantine(p, &p.data)?;
        }
        if p.config.is_file() && read_file(&p.config).map(|b| decode_user_config(&b).is_err())? {
            quarantine(p, &p.config)?;
        }
        Self::open(username, options)
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn paths(&self) -> &UserPaths {
        &self.paths
    }

    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    pub fn boot(&self) -> &UserData {
        self.session.boot()
    }

    pub fn staged(&self) -> &UserData {
        self.session.staged()
    }

    pub fn combined(&self) -> &UserData {
        self.session.combined()
    }

    pub fn has_changes(&self) -> bool {
        self.session.has_changes()
    }

    pub fn pending_count(&self) -> usize {
        self.session.pending_count()
    }

    pub fn add_expense(&mut self, expense: Expense) -> EntryId {
        self.session.add_expense(expense)
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.session.add_tag(tag)
    }

    /// Writes the combined view and the refreshed config. Returns `false`
    /// without touching disk when nothing is staged. On error the staged
    /// layer is kept so the save can be retried.
    pub fn save(&mut self) -> Result<bool, StoreError> {
        if !self.session.has_changes() {
            debug!("nothing to save for {}", self.config.username);
            return Ok(false);
        }

        let data = encode(&self.paths.data, self.session.combined())?;
        write_atomic(&self.paths.data, &data)?;
        write_backup(&self.paths, &data, self.max_backups)?;

        let mut config = self.config.clone();
        config.data_size = format_size(dir_size(&self.paths.dir)?);
        write_atomic(&self.paths.config, &encode(&self.paths.config, &config)?)?;

        self.config = config;
        let written = self.session.pending_count();
        self.session.commit();
        info!(
            "saved {written} pending entries for {} ({})",
            self.config.username, self.config.data_size
        );
        Ok(true)
    }

    pub fn revert(&mut self) {
        let discarded = self.session.pending_count();
        self.session.revert();
        info!(
            "discarded {discarded} pending entries for {}",
            self.config.username
        );
    }
}

/// Writes an empty record and, when missing, a first-launch config. Returns
/// `true` when the config was created here.
fn bootstrap(paths: &UserPaths, username: &str) -> Result<bool, StoreError> {
    info!("creating data for new user {username} in {}", paths.dir.display());
    write_atomic(&paths.data, &encode(&paths.data, &UserData::default())?)?;
    if paths.config.is_file() {
        return Ok(false);
    }
    let mut config = UserConfig::new(username);
    config.launches = 1;
    config.data_size = format_size(dir_size(&paths.dir)?);
    write_atomic(&paths.config, &encode(&paths.config, &config)?)?;
    Ok(true)
}

fn load_data(path: &Path) -> Result<UserData, StoreError> {
    let bytes = read_file(path)?;
    let mut data = decode_user_data(&bytes).map_err(|issue| {
        error!(
            "corrupt data file {} (field: {}): {}",
            path.display(),
            issue.field.as_deref().unwrap_or("<document>"),
            issue.reason
        );
        StoreError::CorruptData {
            path: path.to_path_buf(),
            issue,
        }
    })?;
    let repaired = data.repair_indices();
    if repaired > 0 {
        warn!("restored {repaired} index entries missing from {}", path.display());
    }
    Ok(data)
}

fn load_config(paths: &UserPaths, username: &str) -> Result<UserConfig, StoreError> {
    let bytes = match fs::read(&paths.config) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} is missing; starting a new config", paths.config.display());
            let mut config = UserConfig::new(username);
            config.data_size = format_size(dir_size(&paths.dir)?);
            return Ok(config);
        }
        Err(e) => return Err(StoreError::persistence(&paths.config, e)),
    };
    let mut config = decode_user_config(&bytes).map_err(|issue| {
        error!("corrupt config file {}: {issue}", paths.config.display());
        StoreError::CorruptData {
            path: paths.config.clone(),
            issue,
        }
    })?;
    if config.username != username {
        warn!(
            "config names user {:?}, expected {username:?}; correcting",
            config.username
        );
        config.username = username.to_string();
    }
    Ok(config)
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|e| StoreError::persistence(path, e))
}

fn encode<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::persistence(path, e.into()))
}

/// Temp file in the target directory, flushed, then renamed over the target.
/// The temp file is removed on any early return.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |e: std::io::Error| StoreError::persistence(path, e);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn write_backup(paths: &UserPaths, bytes: &[u8], keep: usize) -> Result<(), StoreError> {
    fs::create_dir_all(&paths.backups).map_err(|e| StoreError::persistence(&paths.backups, e))?;
    let ts = file_stamp();
    write_atomic(&paths.backups.join(format!("data-{ts}.json")), bytes)?;
    rotate_backups(&paths.backups, keep)
}

/// UTC so that names sort in write order across DST changes.
fn file_stamp() -> String {
    Utc::now().format(STAMP_FORMAT).to_string()
}

/// Keeps the newest `keep` save backups. Quarantined corrupt files are never rotated out.
fn rotate_backups(dir: &Path, keep: usize) -> Result<(), StoreError> {
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| StoreError::persistence(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            name.starts_with("data-") && name.ends_with(".json")
        })
        .collect();
    names.sort();
    if names.len() > keep {
        for p in &names[..names.len() - keep] {
            if let Err(e) = fs::remove_file(p) {
                warn!("could not remove old backup {}: {e}", p.display());
            }
        }
    }
    Ok(())
}

fn quarantine(paths: &UserPaths, file: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(&paths.backups).map_err(|e| StoreError::persistence(&paths.backups, e))?;
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ts = file_stamp();
    let target = paths.backups.join(format!("corrupt-{stem}-{ts}.json"));
    fs::rename(file, &target).map_err(|e| StoreError::persistence(file, e))?;
    warn!("moved unreadable {} to {}", file.display(), target.display());
    Ok(())
}

/// Total size in bytes of every file below `dir`.
pub fn dir_size(dir: &Path) -> Result<u64, StoreError> {
    let mut total = 0;
    for entry in fs::read_dir(dir).map_err(|e| StoreError::persistence(dir, e))? {
        let entry = entry.map_err(|e| StoreError::persistence(dir, e))?;
        let meta = entry
            .metadata()
            .map_err(|e| StoreError::persistence(entry.path(), e))?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

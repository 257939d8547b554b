// src/bot/persistence.rs - Ignore list file, read at startup and written at shutdown

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bot::state::BotState;
use crate::error::PersistenceError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IgnoreListFile {
    #[serde(rename = "ignore-users", default)]
    ignore_users: Vec<String>,
}

/// Load the ignored user ids from `path`.
///
/// A missing file is fine and yields an empty list. A file that exists but
/// cannot be read or parsed is an error: dropping it silently would forget
/// everyone who opted out.
pub fn load_ignore_users(path: &Path) -> Result<Vec<String>, PersistenceError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("No ignore list found at {}, starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(PersistenceError::Read { path: path.to_path_buf(), source });
        }
    };

    let file: IgnoreListFile = serde_json::from_str(&content)
        .map_err(|source| PersistenceError::Malformed { path: path.to_path_buf(), source })?;

    info!("Loaded {} ignored users from {}", file.ignore_users.len(), path.display());
    Ok(file.ignore_users)
}

/// Overwrite `path` with the given ids. The file is flushed and synced
/// before this returns.
pub fn save_ignore_users(path: &Path, ids: &[String]) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    let payload = IgnoreListFile { ignore_users: ids.to_vec() };

    serde_json::to_writer(&mut writer, &payload)
        .map_err(|e| write_err(io::Error::from(e)))?;
    writer.flush().map_err(write_err)?;
    writer.get_ref().sync_all().map_err(write_err)?;

    info!("Saved {} ignored users to {}", ids.len(), path.display());
    Ok(())
}

/// Saves the ignore list exactly once when the bot stops.
///
/// Call [`IgnoreListGuard::commit`] on the normal path to see the result.
/// If the guard is dropped without a commit (an early `?` return or a panic
/// unwinding through `main`) the save happens in `Drop` instead.
pub struct IgnoreListGuard {
    state: Arc<BotState>,
    path: PathBuf,
    saved: bool,
}

impl IgnoreListGuard {
    pub fn new(state: Arc<BotState>, path: impl Into<PathBuf>) -> Self {
        Self { state, path: path.into(), saved: false }
    }

    /// Load the file into `state` and return a guard that writes it back
    pub fn load(state: Arc<BotState>, path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let ids = load_ignore_users(&path)?;
        state.replace_ignored(ids);
        Ok(Self::new(state, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> Result<(), PersistenceError> {
        self.save_once()
    }

    fn save_once(&mut self) -> Result<(), PersistenceError> {
        if self.saved {
            return Ok(());
        }
        self.saved = true;
        let ids = self.state.list_ignored();
        save_ignore_users(&self.path, &ids)
    }
}

impl Drop for IgnoreListGuard {
    fn drop(&mut self) {
        if self.saved {
            return;
        }
        debug!("Ignore list guard dropped without commit, saving now");
        if let Err(e) = self.save_once() {
            error!("Failed to save ignore list on exit: {}", e);
        }
    }
}

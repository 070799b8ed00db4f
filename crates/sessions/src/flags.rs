use std::{
    collections::BTreeSet,
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use {
    fd_lock::RwLock,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Which durable set an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    /// Conversations where the auto-reply already fired.
    Triggered,
    /// Conversations hidden from the panel list.
    Hidden,
    /// Conversations treated as unknown contacts regardless of the address book.
    Overrides,
}

impl FlagKind {
    pub const ALL: [Self; 3] = [Self::Triggered, Self::Hidden, Self::Overrides];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Hidden => "hidden",
            Self::Overrides => "overrides",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Triggered => "bot_triggers.json",
            Self::Hidden => "hidden_chats.json",
            Self::Overrides => "strangers_override.json",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "triggered" | "triggers" => Ok(Self::Triggered),
            "hidden" => Ok(Self::Hidden),
            "overrides" | "override" | "strangers" => Ok(Self::Overrides),
            other => Err(Error::message(format!("unknown flag set: {other}"))),
        }
    }
}

/// A set of conversation ids mirrored to a JSON array file.
///
/// Every mutation rewrites the whole file before returning. Mutations take a
/// process-local lock so concurrent writers never lose updates.
pub struct FlagSet {
    kind: FlagKind,
    path: PathBuf,
    ids: Mutex<BTreeSet<String>>,
}

impl FlagSet {
    /// Load from `path`. A missing or unreadable file yields an empty set.
    pub fn load(kind: FlagKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match read_ids(&path) {
            Ok(ids) => {
                debug!(set = %kind, path = %path.display(), count = ids.len(), "loaded flag set");
                ids
            },
            Err(e) => {
                warn!(
                    set = %kind,
                    path = %path.display(),
                    error = %e,
                    "flag set unreadable, starting empty"
                );
                BTreeSet::new()
            },
        };
        Self {
            kind,
            path,
            ids: Mutex::new(ids),
        }
    }

    pub fn kind(&self) -> FlagKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.guard().contains(id)
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn list(&self) -> Vec<String> {
        self.guard().iter().cloned().collect()
    }

    /// Add `id` and flush. Returns whether the set changed.
    ///
    /// The check and the insert happen under one lock with no suspension in
    /// between, so exactly one of several concurrent callers sees `true`.
    /// An `Err` is only possible after a change: the id is in memory but the
    /// file could not be written.
    pub fn insert(&self, id: &str) -> Result<bool> {
        let mut ids = self.guard();
        if !ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.write_locked(&ids)?;
        Ok(true)
    }

    /// Remove `id` and flush. Same contract as [`FlagSet::insert`].
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut ids = self.guard();
        if !ids.remove(id) {
            return Ok(false);
        }
        self.write_locked(&ids)?;
        Ok(true)
    }

    /// Rewrite the file from the in-memory set.
    pub fn flush(&self) -> Result<()> {
        let ids = self.guard();
        self.write_locked(&ids)
    }

    fn guard(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_locked(&self, ids: &BTreeSet<String>) -> Result<()> {
        write_ids(&self.path, ids).map_err(|source| {
            warn!(
                set = %self.kind,
                path = %self.path.display(),
                error = %source,
                "flag set flush failed"
            );
            Error::Persist {
                set: self.kind.as_str(),
                path: self.path.clone(),
                source: Box::new(source),
            }
        })
    }
}

fn read_ids(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let ids: Vec<String> = serde_json::from_str(&raw)?;
    Ok(ids.into_iter().collect())
}

/// Write the set to `<file>.tmp` under an exclusive lock, then rename it
/// over the target. A torn write never replaces the previous file.
fn write_ids(path: &Path, ids: &BTreeSet<String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&ids.iter().collect::<Vec<_>>())?;
    let tmp = temp_path(path);
    let written =
        write_temp(&tmp, json.as_bytes()).and_then(|()| fs::rename(&tmp, path).map_err(Error::from));
    if written.is_err() && tmp.is_file() {
        fs::remove_file(&tmp).ok();
    }
    written
}

fn write_temp(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)?;
    let mut lock = RwLock::new(file);
    let mut guard = lock
        .write()
        .map_err(|e| Error::lock_failed(e.to_string()))?;
    guard.write_all(bytes)?;
    guard.flush()?;
    guard.sync_all()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// The three durable sets the panel keeps under its data directory.
pub struct FlagSets {
    pub triggered: FlagSet,
    pub hidden: FlagSet,
    pub overrides: FlagSet,
}

impl FlagSets {
    pub fn load(data_dir: &Path) -> Self {
        let load = |kind: FlagKind| FlagSet::load(kind, data_dir.join(kind.file_name()));
        Self {
            triggered: load(FlagKind::Triggered),
            hidden: load(FlagKind::Hidden),
            overrides: load(FlagKind::Overrides),
        }
    }

    pub fn get(&self, kind: FlagKind) -> &FlagSet {
        match kind {
            FlagKind::Triggered => &self.triggered,
            FlagKind::Hidden => &self.hidden,
            FlagKind::Overrides => &self.overrides,
        }
    }
}

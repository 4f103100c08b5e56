//! File-backed complaint storage
//!
//! One JSON file per complaint in a base directory. Writes go to a hidden
//! temp file in the same directory, are fsynced, then renamed over the final
//! name, so readers never see a half-written record.
//!
//! ## Naming schemes
//!
//! | Scheme | File name | `find_by_id` |
//! |--------|-----------|--------------|
//! | [`NamingScheme::Id`] (default) | `<uuid>.json` | direct path read |
//! | [`NamingScheme::Timestamp`] | `2024-11-09_12-18-30-<session>-<id8>.json` | directory scan |
//!
//! There is no secondary index: listing, filtering, and search decode every
//! file on each call.
//!
//! ## Mirrors
//!
//! An optional global directory receives a copy of each record (always
//! ID-named), and an optional docs directory receives a Markdown rendering.
//! Both are best-effort: failures are logged and never fail the write.

use crate::cancel::CancelToken;
use crate::complaint::Complaint;
use crate::docs;
use crate::error::{Error, Result};
use crate::ids::ComplaintId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "json";

/// How record files are named inside the base directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// `<complaint-id>.json`
    #[default]
    Id,
    /// `<YYYY-MM-DD_HH-MM-SS>-<session>-<id8>.json`, kept for old stores
    Timestamp,
}

/// Storage settings, normally taken from the `[storage]` config section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Authoritative record directory
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Secondary copy of every record (optional)
    #[serde(default)]
    pub global_dir: Option<PathBuf>,

    /// Markdown mirror for browsing (optional)
    #[serde(default)]
    pub docs_dir: Option<PathBuf>,

    /// File naming scheme for `base_dir`
    #[serde(default)]
    pub naming: NamingScheme,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            global_dir: None,
            docs_dir: None,
            naming: NamingScheme::default(),
        }
    }
}

impl StoreConfig {
    /// A config rooted at `base_dir` with no mirrors.
    pub fn at(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }
}

fn default_base_dir() -> PathBuf {
    crate::config::Config::data_dir().join("complaints")
}

/// Durable one-file-per-complaint store.
#[derive(Debug)]
pub struct FileStore {
    config: StoreConfig,
}

impl FileStore {
    /// Open a store, creating the base directory if needed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_dir)
            .map_err(|e| Error::io("create directory", &config.base_dir, e))?;
        tracing::debug!(
            base_dir = %config.base_dir.display(),
            naming = ?config.naming,
            "Opened complaint store"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Path a complaint is written to under the configured scheme.
    fn path_for(&self, complaint: &Complaint) -> PathBuf {
        match self.config.naming {
            NamingScheme::Id => self.id_path(complaint.id()),
            NamingScheme::Timestamp => self.config.base_dir.join(timestamp_file_name(complaint)),
        }
    }

    fn id_path(&self, id: &ComplaintId) -> PathBuf {
        self.config
            .base_dir
            .join(format!("{}.{}", id.as_str(), RECORD_EXT))
    }

    /// Find the file holding `id`, if any.
    fn locate(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Option<(PathBuf, Complaint)>> {
        let direct = self.id_path(id);
        match read_record(&direct) {
            Ok(complaint) => return Ok(Some((direct, complaint))),
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if self.config.naming == NamingScheme::Id {
            return Ok(None);
        }

        // Names written by this store end in the short ID, so try those first.
        // Older files may be named by timestamp and session only, which
        // leaves a full scan with early exit.
        let suffix = format!("-{}.{}", id.short(), RECORD_EXT);
        let (candidates, rest): (Vec<_>, Vec<_>) = self.list_files()?.into_iter().partition(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
        });
        for path in candidates.into_iter().chain(rest) {
            cancel.check("scan")?;
            match read_record(&path) {
                Ok(complaint) if complaint.id() == id => return Ok(Some((path, complaint))),
                Ok(_) => {}
                Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        Ok(None)
    }

    /// Write a complaint, replacing any previous version.
    pub fn save(&self, cancel: &CancelToken, complaint: &Complaint) -> Result<PathBuf> {
        cancel.check("save")?;
        complaint.validate()?;

        let path = self.path_for(complaint);
        let previous = match self.config.naming {
            NamingScheme::Id => None,
            NamingScheme::Timestamp => self.locate(cancel, complaint.id())?.map(|(p, _)| p),
        };

        let data = serde_json::to_vec_pretty(complaint)?;
        atomic_write(&path, &data)?;

        if let Some(old) = previous.filter(|old| *old != path) {
            fs::remove_file(&old).map_err(|e| Error::io("remove stale record", &old, e))?;
        }

        self.write_mirrors(complaint, &data);
        tracing::debug!(id = %complaint.id(), path = %path.display(), "Wrote complaint");
        Ok(path)
    }

    /// Rewrite an existing complaint. Fails with `NotFound` if it was never saved.
    pub fn update(&self, cancel: &CancelToken, complaint: &Complaint) -> Result<PathBuf> {
        cancel.check("update")?;
        if self.locate(cancel, complaint.id())?.is_none() {
            return Err(Error::NotFound {
                id: complaint.id().to_string(),
            });
        }
        self.save(cancel, complaint)
    }

    /// Remove a complaint and its mirrors.
    pub fn delete(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<()> {
        cancel.check("delete")?;
        let (path, complaint) = self.locate(cancel, id)?.ok_or_else(|| Error::NotFound {
            id: id.to_string(),
        })?;
        fs::remove_file(&path).map_err(|e| Error::io("delete", &path, e))?;

        if let Some(global) = &self.config.global_dir {
            let mirror = global.join(format!("{}.{}", id.as_str(), RECORD_EXT));
            if let Err(e) = fs::remove_file(&mirror) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %mirror.display(), error = %e, "Failed to remove global mirror");
                }
            }
        }
        if let Some(docs_dir) = &self.config.docs_dir {
            let doc = docs_dir.join(docs::docs_file_name(&complaint));
            if let Err(e) = fs::remove_file(&doc) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %doc.display(), error = %e, "Failed to remove docs mirror");
                }
            }
        }
        tracing::debug!(id = %id, "Deleted complaint");
        Ok(())
    }

    /// Load a single complaint.
    pub fn find_by_id(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Complaint> {
        cancel.check("find_by_id")?;
        self.locate(cancel, id)?
            .map(|(_, complaint)| complaint)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    /// Path of the file currently holding `id`.
    pub fn file_path(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<PathBuf> {
        self.locate(cancel, id)?
            .map(|(path, _)| path)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    /// Where the docs mirror for `complaint` lives, if the mirror is enabled.
    pub fn docs_path(&self, complaint: &Complaint) -> Option<PathBuf> {
        self.config
            .docs_dir
            .as_ref()
            .map(|dir| dir.join(docs::docs_file_name(complaint)))
    }

    /// Every record in the base directory, oldest first.
    ///
    /// Unreadable or corrupt files are skipped with a warning so one bad file
    /// does not hide the rest.
    pub fn load_all(&self, cancel: &CancelToken) -> Result<Vec<Complaint>> {
        cancel.check("scan")?;
        let mut complaints = Vec::new();
        for path in self.list_files()? {
            cancel.check("scan")?;
            match read_record(&path) {
                Ok(complaint) => complaints.push(complaint),
                Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                    // Deleted between listing and reading
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record")
                }
            }
        }
        sort_chronologically(&mut complaints);
        Ok(complaints)
    }

    /// One page of records in chronological order.
    pub fn find_all(&self, cancel: &CancelToken, limit: usize, offset: usize) -> Result<Vec<Complaint>> {
        Ok(self
            .load_all(cancel)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Records matching `predicate`, oldest first, at most `limit` of them.
    pub fn find_where<P>(&self, cancel: &CancelToken, limit: Option<usize>, predicate: P) -> Result<Vec<Complaint>>
    where
        P: Fn(&Complaint) -> bool,
    {
        Ok(self
            .load_all(cancel)?
            .into_iter()
            .filter(|c| predicate(c))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Number of record files in the base directory.
    pub fn count(&self) -> Result<usize> {
        Ok(self.list_files()?.len())
    }

    /// Record files in the base directory. Temp files never match.
    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let dir = glob::Pattern::escape(&self.config.base_dir.to_string_lossy());
        let pattern = format!("{}/*.{}", dir.trim_end_matches('/'), RECORD_EXT);

        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("invalid store path {}: {}", pattern, e)))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to read store directory entry"),
            }
        }
        Ok(files)
    }

    fn write_mirrors(&self, complaint: &Complaint, data: &[u8]) {
        if let Some(global) = &self.config.global_dir {
            let path = global.join(format!("{}.{}", complaint.id().as_str(), RECORD_EXT));
            let result = fs::create_dir_all(global)
                .map_err(|e| Error::io("create directory", global, e))
                .and_then(|_| atomic_write(&path, data));
            if let Err(e) = result {
                tracing::warn!(id = %complaint.id(), error = %e, "Failed to write global mirror");
            }
        }

        if let Some(docs_dir) = &self.config.docs_dir {
            let path = docs_dir.join(docs::docs_file_name(complaint));
            let markdown = docs::render_markdown(complaint);
            let result = fs::create_dir_all(docs_dir)
                .map_err(|e| Error::io("create directory", docs_dir, e))
                .and_then(|_| atomic_write(&path, markdown.as_bytes()));
            if let Err(e) = result {
                tracing::warn!(id = %complaint.id(), error = %e, "Failed to write docs mirror");
            }
        }
    }
}

/// Legacy chronological file name for a complaint.
fn timestamp_file_name(complaint: &Complaint) -> String {
    let session = if complaint.session_id().is_empty() {
        "no-session".to_string()
    } else {
        docs::slug(complaint.session_id().as_str())
    };
    format!(
        "{}-{}-{}.{}",
        complaint.timestamp().format("%Y-%m-%d_%H-%M-%S"),
        session,
        complaint.id().short(),
        RECORD_EXT
    )
}

pub(crate) fn sort_chronologically(complaints: &mut [Complaint]) {
    complaints.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn read_record(path: &Path) -> Result<Complaint> {
    let data = fs::read(path).map_err(|e| Error::io("read", path, e))?;
    serde_json::from_slice(&data).map_err(|source| Error::CorruptRecord {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `data` to `path` via temp file, fsync, and rename.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".complaint-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io("create temp file", dir, e))?;
    temp.write_all(data)
        .map_err(|e| Error::io("write temp file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io("sync temp file", temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| Error::io("rename temp file", path, e.error))?;

    #[cfg(unix)]
    {
        if let Ok(dir) = fs::File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

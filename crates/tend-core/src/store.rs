//! Session store: one JSON file per session.
//!
//! Every write goes to a fresh temporary file in the store directory which is
//! then renamed over `<id>.json`, so readers never observe a partial record.
//! There is no locking between processes: hook invocations, the monitor and
//! CLI commands all write independently and the last rename wins.

use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::SessionRecord;

const RECORD_EXT: &str = "json";
/// How much of an unreadable record is echoed into the log.
const RAW_LOG_LIMIT: usize = 512;

/// Directory-backed session store.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXT))
    }

    /// Map a path inside the store directory back to a session id.
    ///
    /// Temporary files (leading dot) and foreign files yield `None`.
    pub fn id_from_path(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || stem.starts_with('.') {
            return None;
        }
        Some(stem.to_string())
    }

    /// Persist a record, refreshing `updated_at`.
    pub fn save(&self, record: &mut SessionRecord) -> Result<()> {
        validate_id(&record.id)?;
        // Never move updated_at backwards, even if the wall clock does.
        record.updated_at = Utc::now().max(record.updated_at);
        self.write_atomic(record)
    }

    fn write_atomic(&self, record: &SessionRecord) -> Result<()> {
        let content = serde_json::to_vec_pretty(record)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(".partial")
            .tempfile_in(&self.dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        persist(tmp, &self.path_for(&record.id))?;
        debug!("Saved session record {}", record.id);
        Ok(())
    }

    /// Load a record by exact id.
    pub fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        validate_id(id)?;
        let path = self.path_for(id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.parse_record(&path, &raw).map(Some)
    }

    fn parse_record(&self, path: &Path, raw: &str) -> Result<SessionRecord> {
        let strict_err = match serde_json::from_str::<SessionRecord>(raw) {
            Ok(record) => return Ok(record),
            Err(e) => e,
        };

        // Older writers were not atomic and could leave the tail of a longer,
        // previous record behind the new one. Accept the first complete value.
        let mut stream = serde_json::Deserializer::from_str(raw).into_iter::<SessionRecord>();
        match stream.next() {
            Some(Ok(record)) => {
                warn!(
                    path = %path.display(),
                    error = %strict_err,
                    "Repairing session record with trailing garbage"
                );
                if let Err(e) = self.write_atomic(&record) {
                    warn!(path = %path.display(), error = %e, "Failed to rewrite repaired record");
                }
                Ok(record)
            }
            _ => {
                warn!(
                    path = %path.display(),
                    error = %strict_err,
                    raw = %truncate(raw, RAW_LOG_LIMIT),
                    "Unreadable session record"
                );
                Err(Error::CorruptRecord {
                    path: path.to_path_buf(),
                    reason: strict_err.to_string(),
                })
            }
        }
    }

    /// All readable records, oldest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable store entry");
                    continue;
                }
            };
            if Self::id_from_path(&path).is_none() {
                continue;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable session record");
                    continue;
                }
            };
            match self.parse_record(&path, &raw) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Remove a record. Returns false when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {
                debug!("Deleted session record {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.path_for(id).exists()
    }

    /// Find the record bound to an assistant conversation id.
    pub fn find_by_conversation(&self, conversation_id: &str) -> Result<Option<SessionRecord>> {
        if conversation_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.conversation_id.as_deref() == Some(conversation_id))
            // Prefer the most recently touched binding.
            .max_by_key(|r| r.updated_at))
    }

    /// Resolve a user-supplied id: exact match first, then unique prefix.
    pub fn resolve(&self, query: &str) -> Result<SessionRecord> {
        if query.is_empty() {
            return Err(Error::Validation("session id must not be empty".to_string()));
        }
        if validate_id(query).is_ok() {
            if let Some(record) = self.load(query)? {
                return Ok(record);
            }
        }

        let mut matches: Vec<SessionRecord> = self
            .list()?
            .into_iter()
            .filter(|r| r.id.starts_with(query))
            .collect();

        match matches.len() {
            0 => Err(Error::NotFound(query.to_string())),
            1 => Ok(matches.remove(0)),
            _ => {
                let mut candidates: Vec<String> = matches.into_iter().map(|r| r.id).collect();
                candidates.sort();
                Err(Error::Ambiguous {
                    query: query.to_string(),
                    candidates,
                })
            }
        }
    }
}

/// Reject ids that cannot be used as a plain file name.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("session id must not be empty".to_string()));
    }
    if id.starts_with('.') {
        return Err(Error::Validation(format!("session id must not start with '.': {}", id)));
    }
    if id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control()) {
        return Err(Error::Validation(format!("invalid session id: {}", id)));
    }
    Ok(())
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<()> {
    tmp.persist(target)?;
    Ok(())
}

fn truncate(raw: &str, limit: usize) -> &str {
    match raw.char_indices().nth(limit) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

//! File-backed durability for session attributes.
//!
//! One file per session under a directory. The file holds the encoded
//! attribute map and its mtime mirrors the session's last access, so a
//! restarted process sees how stale each session really is.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::attributes::{Attributes, decode_map};
use crate::config::DEFAULT_PERSIST_TIMEOUT;
use crate::error::{Error, Result};

/// Extension written by older releases. Accepted on read only.
const LEGACY_EXTENSION: &str = ".s";

/// Where a session's attributes live besides memory.
#[derive(Debug, Clone, Default)]
pub(crate) enum Backing {
    #[default]
    Memory,
    File(Arc<FileStore>),
}

/// Extract the session id from a persisted file name.
///
/// Accepts a bare name, or a name carrying the legacy `.s` extension when the
/// whole name is longer than four characters. Everything else (other
/// extensions, hidden and temporary files) is rejected.
pub fn parse_sid_from_file_name(name: &str) -> Option<&str> {
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    if !name.contains('.') {
        return Some(name);
    }
    if name.len() > 4 {
        return name.strip_suffix(LEGACY_EXTENSION);
    }
    None
}

/// Session ids are used as file names; anything that could escape the
/// directory is refused.
fn is_safe_sid(sid: &str) -> bool {
    !sid.is_empty()
        && sid
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Directory of per-session files.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_timeout: Duration,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_write_timeout(dir, DEFAULT_PERSIST_TIMEOUT)
    }

    pub fn with_write_timeout(dir: impl Into<PathBuf>, write_timeout: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self {
            dir,
            write_timeout,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    fn path_for(&self, sid: &str) -> Option<PathBuf> {
        is_safe_sid(sid).then(|| self.dir.join(sid))
    }

    fn legacy_path_for(&self, sid: &str) -> Option<PathBuf> {
        is_safe_sid(sid).then(|| self.dir.join(format!("{sid}{LEGACY_EXTENSION}")))
    }

    fn require_path(&self, sid: &str) -> Result<PathBuf> {
        self.path_for(sid)
            .ok_or_else(|| Error::Persistence(format!("refusing unsafe session id '{sid}'")))
    }

    /// Encode `attrs` and overwrite its session file.
    pub fn save(&self, attrs: &Attributes) -> Result<()> {
        let encoded = attrs.encode()?;
        self.write(attrs.sid(), &encoded, attrs.time_accessed())
    }

    /// Atomically replace the file for `sid` and stamp it with `accessed`.
    pub(crate) fn write(&self, sid: &str, encoded: &[u8], accessed: DateTime<Utc>) -> Result<()> {
        let path = self.require_path(sid)?;
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{sid}.{n}.tmp"));

        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(encoded)?;
            file.set_modified(SystemTime::from(accessed))?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(path, e));
        }
        Ok(())
    }

    /// Delete the file for `sid`. Missing files are not an error.
    pub fn remove(&self, sid: &str) -> Result<()> {
        let paths = [self.path_for(sid), self.legacy_path_for(sid)];
        for path in paths.into_iter().flatten() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(session_id = %sid, path = %path.display(), "Removed session file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(path, e)),
            }
        }
        Ok(())
    }

    /// Truncate the file for `sid` to zero length, keeping it on disk.
    pub fn clear(&self, sid: &str) -> Result<()> {
        let path = self.require_path(sid)?;
        match OpenOptions::new().write(true).truncate(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Whether a file exists for `sid`.
    pub fn has(&self, sid: &str) -> bool {
        self.path_for(sid).is_some_and(|p| p.is_file())
            || self.legacy_path_for(sid).is_some_and(|p| p.is_file())
    }

    /// Load a single session. `Ok(None)` when no file exists.
    pub fn load(self: &Arc<Self>, sid: &str) -> Result<Option<Attributes>> {
        let candidates = [self.path_for(sid), self.legacy_path_for(sid)];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return self.load_file(sid, &path).map(Some);
            }
        }
        Ok(None)
    }

    /// Walk the directory and hand every readable session to `on_loaded`.
    ///
    /// Files with unparseable names are skipped silently; files that fail to
    /// read or decode are logged and skipped. Returns the number loaded.
    pub fn load_all<F>(self: &Arc<Self>, mut on_loaded: F) -> Result<usize>
    where
        F: FnMut(Attributes),
    {
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let mut loaded = 0;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        dir = %self.dir.display(),
                        error = %e,
                        "Failed to read session directory entry"
                    );
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(sid) = file_name.to_str().and_then(parse_sid_from_file_name) else {
                continue;
            };

            match self.load_file(sid, &entry.path()) {
                Ok(attrs) => {
                    on_loaded(attrs);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "Skipping unreadable session file"
                    );
                }
            }
        }

        debug!(dir = %self.dir.display(), loaded, "Loaded persisted sessions");
        Ok(loaded)
    }

    fn load_file(self: &Arc<Self>, sid: &str, path: &Path) -> Result<Attributes> {
        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if !metadata.is_file() {
            return Err(Error::Persistence(format!(
                "'{}' is not a regular file",
                path.display()
            )));
        }
        let accessed: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| Error::io(path, e))?
            .into();

        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let kv = decode_map(&bytes)?;

        Ok(Attributes::restore(
            sid,
            kv,
            accessed,
            Backing::File(Arc::clone(self)),
        ))
    }
}

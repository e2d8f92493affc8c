//! Disk-backed cache store.
//!
//! Layout under the store root:
//!
//! ```text
//! CACHEDIR.TAG        marks the directory as a cache (skipped by backup tools)
//! data/<name>         response body; file mtime is the cache timestamp
//! status/<name>       HTTP status as a 2-byte big-endian integer
//! ```
//!
//! `<name>` is the fingerprint with every byte outside `[A-Za-z0-9._-]`
//! percent-escaped. When the resulting path would exceed the platform limit the
//! name becomes `~` followed by the hex SHA-256 of the fingerprint; `~` never
//! survives escaping, so hashed and escaped names cannot collide.

use super::backend::{CacheStore, CachedResponse};
use crate::Result;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

const DATA_DIR: &str = "data";
const STATUS_DIR: &str = "status";
const TMP_SUFFIX: &str = ".tmp";

const CACHEDIR_TAG: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag created by reqcache.\n\
# For information about cache directory tags see https://bford.info/cachedir/\n";

/// Longest file name component accepted by common filesystems.
const MAX_NAME_LEN: usize = 255;

#[cfg(target_os = "windows")]
const MAX_PATH_LEN: usize = 260;
#[cfg(target_os = "macos")]
const MAX_PATH_LEN: usize = 1024;
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const MAX_PATH_LEN: usize = 4096;

/// Durable [`CacheStore`] with one file pair per fingerprint.
///
/// The store API is synchronous and does blocking filesystem I/O, including an
/// `fsync` per write. Inside a multi-threaded Tokio runtime every call goes
/// through `block_in_place`; on a current-thread runtime it blocks the runtime
/// for the duration of the call.
pub struct DiskStore {
    root: PathBuf,
    // serializes the data/status pair so readers never see half an entry
    lock: Mutex<()>,
}

impl DiskStore {
    /// Open (or create) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DATA_DIR))?;
        fs::create_dir_all(root.join(STATUS_DIR))?;
        let tag = root.join("CACHEDIR.TAG");
        if !tag.exists() {
            fs::write(&tag, CACHEDIR_TAG)?;
        }
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name used for `fingerprint`.
    pub fn file_name(&self, fingerprint: &str) -> String {
        let escaped = escape(fingerprint);
        let composed = self.root.join(DATA_DIR).join(&escaped);
        let too_long =
            escaped.len() > MAX_NAME_LEN || composed.as_os_str().len() > MAX_PATH_LEN;
        if too_long {
            hashed_name(fingerprint)
        } else {
            escaped
        }
    }

    fn paths(&self, fingerprint: &str) -> (PathBuf, PathBuf) {
        let name = self.file_name(fingerprint);
        (
            self.root.join(DATA_DIR).join(&name),
            self.root.join(STATUS_DIR).join(&name),
        )
    }

    fn write_entry(data: &Path, status: &Path, response: &CachedResponse) -> std::io::Result<()> {
        let mut tmp_name = data.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp)?;
        file.write_all(&response.body)?;
        file.set_modified(response.timestamp)?;
        file.sync_all()?;
        drop(file);

        fs::write(status, response.status.to_be_bytes())?;
        fs::rename(&tmp, data)?;
        Ok(())
    }

    fn read_entry(data: &Path, status: &Path) -> std::io::Result<CachedResponse> {
        let mut raw = [0u8; 2];
        File::open(status)?.read_exact(&mut raw)?;

        let mut file = OpenOptions::new().read(true).open(data)?;
        let timestamp: SystemTime = file.metadata()?.modified()?;
        let mut body = Vec::new();
        file.read_to_end(&mut body)?;

        Ok(CachedResponse::stored_at(
            u16::from_be_bytes(raw),
            body,
            timestamp,
        ))
    }

    fn discard(data: &Path, status: &Path) {
        for path in [data, status] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove cache file");
                }
            }
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_entry(&self, fingerprint: &str, response: CachedResponse) {
        let (data, status) = self.paths(fingerprint);
        let _guard = self.guard();
        match Self::write_entry(&data, &status, &response) {
            Ok(()) => debug!(fingerprint, bytes = response.body.len(), "disk store write"),
            Err(e) => {
                warn!(fingerprint, error = %e, "disk store write failed, dropping entry");
                let mut tmp_name = data.as_os_str().to_owned();
                tmp_name.push(TMP_SUFFIX);
                let _ = fs::remove_file(PathBuf::from(tmp_name));
                Self::discard(&data, &status);
            }
        }
    }

    fn get_entry(&self, fingerprint: &str) -> Option<CachedResponse> {
        let (data, status) = self.paths(fingerprint);
        let _guard = self.guard();
        match Self::read_entry(&data, &status) {
            Ok(entry) => Some(entry),
            Err(e) if e.kind() == ErrorKind::NotFound && !data.exists() && !status.exists() => {
                None
            }
            Err(e) => {
                warn!(fingerprint, error = %e, "disk store entry unreadable, removing");
                Self::discard(&data, &status);
                None
            }
        }
    }

    fn remove_entry(&self, fingerprint: &str) {
        let (data, status) = self.paths(fingerprint);
        let _guard = self.guard();
        Self::discard(&data, &status);
    }

    fn clear_entries(&self) {
        let _guard = self.guard();
        for dir in [DATA_DIR, STATUS_DIR] {
            let path = self.root.join(dir);
            if let Err(e) = fs::remove_dir_all(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to clear cache directory");
                }
            }
            if let Err(e) = fs::create_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "failed to recreate cache directory");
            }
        }
    }

    fn count_entries(&self) -> usize {
        let _guard = self.guard();
        match fs::read_dir(self.root.join(DATA_DIR)) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| !e.file_name().to_string_lossy().ends_with(TMP_SUFFIX))
                .count(),
            Err(_) => 0,
        }
    }
}

impl CacheStore for DiskStore {
    fn put(&self, fingerprint: &str, response: CachedResponse) {
        blocking(|| self.put_entry(fingerprint, response))
    }

    fn get(&self, fingerprint: &str) -> Option<CachedResponse> {
        blocking(|| self.get_entry(fingerprint))
    }

    fn remove(&self, fingerprint: &str) {
        blocking(|| self.remove_entry(fingerprint))
    }

    fn remove_all(&self) {
        blocking(|| self.clear_entries())
    }

    fn len(&self) -> usize {
        blocking(|| self.count_entries())
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

/// Run filesystem work from inside the resolver. On a multi-threaded Tokio
/// runtime the worker hands its other tasks off first, so a slow disk does not
/// stall them; elsewhere the work simply runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn escape(fingerprint: &str) -> String {
    let mut out = String::with_capacity(fingerprint.len());
    for (i, b) in fingerprint.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn hashed_name(fingerprint: &str) -> String {
    let digest = Sha256::digest(fingerprint.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("~{}", hex)
}

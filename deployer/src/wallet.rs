//! Persist named signing identities.
//!
//! A [Store] maps a principal name to exactly one [Identity]. Identities are immutable once
//! created: [Store::put] rejects a name that is already taken rather than overwriting it.
//! [FileSystem] upholds this across processes sharing a directory: when two writers race on a
//! name, exactly one of them stores its identity.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tracing::debug;

/// Extension of identity files written by [FileSystem].
const IDENTITY_EXTENSION: &str = "id";

/// Distinguishes temporary files written by concurrent [FileSystem::put] calls in one process.
static TEMPORARY: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("identity not found: {0}")]
    NotFound(String),
    #[error("identity already exists: {0}")]
    AlreadyExists(String),
    #[error("identity name invalid, must only contain alphanumeric, dash ('-'), underscore ('_'), or dot ('.') characters: {0}")]
    InvalidName(String),
    #[error("identity name mismatch: stored under {0} but named {1}")]
    NameMismatch(String, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A signing identity issued by a certificate authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Principal name (unique within a [Store]).
    pub name: String,

    /// Membership service provider (organization) that issued the identity.
    pub msp_id: String,

    /// PEM-encoded X.509 certificate.
    pub certificate: String,

    /// PEM-encoded private key.
    pub private_key: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("msp_id", &self.msp_id)
            .field("certificate", &self.certificate)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Storage for named [Identity]s.
pub trait Store {
    /// Returns whether an identity is stored under `name`.
    fn exists(&self, name: &str) -> Result<bool, Error>;

    /// Stores `identity` under `name`.
    ///
    /// Fails if `name` is already taken.
    fn put(&mut self, name: &str, identity: &Identity) -> Result<(), Error>;

    /// Loads the identity stored under `name`.
    fn get(&self, name: &str) -> Result<Identity, Error>;
}

/// Ensure `name` is safe to use as a file name.
fn validate(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A [Store] that keeps one JSON file per identity in a directory.
#[derive(Clone, Debug)]
pub struct FileSystem {
    directory: PathBuf,
}

impl FileSystem {
    /// Opens (creating if necessary) a wallet rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        debug!(path = ?directory, "opened wallet");
        Ok(Self { directory })
    }

    /// Returns the directory backing this wallet.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.{IDENTITY_EXTENSION}"))
    }
}

impl Store for FileSystem {
    fn exists(&self, name: &str) -> Result<bool, Error> {
        validate(name)?;
        Ok(self.path(name).is_file())
    }

    fn put(&mut self, name: &str, identity: &Identity) -> Result<(), Error> {
        validate(name)?;
        let path = self.path(name);
        if path.exists() {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        // Write to a private temporary file, then link it into place. Linking fails if the name
        // was taken in the meantime, so an existing identity is never replaced.
        let temporary = self.directory.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TEMPORARY.fetch_add(1, Ordering::Relaxed)
        ));
        let linked = fs::write(&temporary, serde_json::to_vec_pretty(identity)?)
            .and_then(|()| fs::hard_link(&temporary, &path));
        let removed = fs::remove_file(&temporary);
        match linked {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        removed?;
        debug!(name, path = ?path, "stored identity");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Identity, Error> {
        validate(name)?;
        let path = self.path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let identity: Identity = serde_json::from_slice(&bytes)?;
        if identity.name != name {
            return Err(Error::NameMismatch(name.to_string(), identity.name));
        }
        Ok(identity)
    }
}

/// A [Store] held entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    identities: HashMap<String, Identity>,
}

impl Memory {
    /// Returns the number of stored identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Store for Memory {
    fn exists(&self, name: &str) -> Result<bool, Error> {
        validate(name)?;
        Ok(self.identities.contains_key(name))
    }

    fn put(&mut self, name: &str, identity: &Identity) -> Result<(), Error> {
        validate(name)?;
        if self.identities.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        self.identities.insert(name.to_string(), identity.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Identity, Error> {
        validate(name)?;
        self.identities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, trace};

use super::{CATALOG_VERSION, Catalog};
use crate::error::{CatalogError, StoreError};

/// File-backed catalog with lock-protected transactions.
///
/// Every command opens the store, runs one read or one transaction, and
/// exits. A transaction only reaches disk when its closure returns `Ok`,
/// and the rename happens before the lock is released, so the next process
/// always sees the committed state.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

/// Holds an `fs2` lock on the sibling `.lock` file until dropped.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            debug!(%error, "catalog unlock failed");
        }
    }
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn acquire(&self, exclusive: bool) -> Result<LockGuard, StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;
        if exclusive {
            FileExt::lock_exclusive(&file).map_err(|e| self.io_error(e))?;
        } else {
            FileExt::lock_shared(&file).map_err(|e| self.io_error(e))?;
        }
        trace!(path = %self.path.display(), exclusive, "catalog lock acquired");
        Ok(LockGuard { file })
    }

    fn load_unlocked(&self) -> Result<Catalog, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotInitialized {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let catalog: Catalog =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        if catalog.version != CATALOG_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                version: catalog.version,
            });
        }
        Ok(catalog)
    }

    fn persist_unlocked(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(catalog).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        staged.write_all(&json).map_err(|e| self.io_error(e))?;
        staged.write_all(b"\n").map_err(|e| self.io_error(e))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| self.io_error(e))?;
        staged
            .persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Create a fresh catalog. Refuses to clobber an existing one unless
    /// `force` is set.
    pub fn init(&self, zone: &str, admin: &str, force: bool) -> Result<Catalog, StoreError> {
        let _guard = self.acquire(true)?;
        if self.exists() && !force {
            return Err(StoreError::AlreadyInitialized {
                path: self.path.clone(),
            });
        }
        if zone.is_empty() || zone.contains('/') || admin.is_empty() {
            return Err(CatalogError::InvalidArgument(format!(
                "invalid zone '{zone}' or admin '{admin}'"
            ))
            .into());
        }
        let catalog = Catalog::bootstrap(zone, admin);
        self.persist_unlocked(&catalog)?;
        debug!(path = %self.path.display(), zone, admin, "catalog initialized");
        Ok(catalog)
    }

    /// Snapshot the catalog under a shared lock.
    pub fn load(&self) -> Result<Catalog, StoreError> {
        let _guard = self.acquire(false)?;
        self.load_unlocked()
    }

    /// Run a read-only operation under a shared lock.
    pub fn read<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Catalog) -> Result<T, CatalogError>,
    {
        let _guard = self.acquire(false)?;
        let catalog = self.load_unlocked()?;
        Ok(operation(&catalog)?)
    }

    /// Run a mutation under an exclusive lock.
    ///
    /// The closure works on a private copy; an `Err` discards it and leaves
    /// the file untouched.
    pub fn transact<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, CatalogError>,
    {
        let _guard = self.acquire(true)?;
        let original = self.load_unlocked()?;
        let mut working = original.clone();
        let result = operation(&mut working)?;
        if working != original {
            self.persist_unlocked(&working)?;
            debug!(path = %self.path.display(), "catalog transaction committed");
        }
        Ok(result)
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::debug;

use super::{DriverError, Programs, Session};
use crate::avu::AvuPattern;
use crate::catalog::store::CatalogStore;
use crate::catalog::{DEFAULT_ADMIN, DEFAULT_ZONE, TargetKind, UserKind};

/// Regular users created for every environment.
pub const USER_NAMES: [&str; 2] = ["alice", "bobby"];

/// Local file every environment starts with, inside the work directory. It is
/// also registered as a data object in the admin's home collection.
pub const TEST_FILE: &str = "testfile.txt";

const TEST_FILE_CONTENT: &[u8] = b"I AM A TESTFILE -- [testfile.txt]\n";

/// A throwaway catalog with an admin and two regular users.
///
/// Dropping the environment removes its directory and everything in it.
pub struct Environment {
    dir: TempDir,
    store: CatalogStore,
    pub admin: Session,
    pub user0: Session,
    pub user1: Session,
}

impl Environment {
    pub fn provision(programs: Programs) -> Result<Self, DriverError> {
        let dir = tempfile::tempdir().map_err(|source| DriverError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        let workdir = dir.path().join("work");
        fs::create_dir(&workdir).map_err(|source| DriverError::Io {
            path: workdir.clone(),
            source,
        })?;
        let testfile = workdir.join(TEST_FILE);
        fs::write(&testfile, TEST_FILE_CONTENT).map_err(|source| DriverError::Io {
            path: testfile.clone(),
            source,
        })?;

        let catalog_path = dir.path().join("catalog.json");
        let store = CatalogStore::new(&catalog_path);
        store.init(DEFAULT_ZONE, DEFAULT_ADMIN, false)?;
        store.transact(|catalog| {
            let admin = catalog.actor(DEFAULT_ADMIN)?;
            for name in USER_NAMES {
                catalog.create_user(&admin, name, UserKind::RodsUser)?;
            }
            catalog.register_data_object(
                &admin,
                TEST_FILE,
                TEST_FILE_CONTENT.len() as u64,
                &format!("blake3:{}", blake3::hash(TEST_FILE_CONTENT).to_hex()),
                false,
            )?;
            Ok(())
        })?;
        debug!(dir = %dir.path().display(), "environment provisioned");

        let programs = Arc::new(programs);
        let session = |name: &str| {
            Session::new(
                name,
                DEFAULT_ZONE,
                &catalog_path,
                &workdir,
                Arc::clone(&programs),
            )
        };
        Ok(Self {
            admin: session(DEFAULT_ADMIN),
            user0: session(USER_NAMES[0]),
            user1: session(USER_NAMES[1]),
            store,
            dir,
        })
    }

    /// Root of the temporary directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of the local test file. Commands run in the work
    /// directory, so [`TEST_FILE`] alone names it there too.
    pub fn testfile(&self) -> PathBuf {
        self.admin.workdir().join(TEST_FILE)
    }

    /// Direct access to the catalog for structured assertions.
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn sessions(&self) -> [&Session; 3] {
        [&self.admin, &self.user0, &self.user1]
    }

    /// Strip every AVU from every session user in one transaction.
    pub fn reset_user_metadata(&self) -> Result<usize, DriverError> {
        let pattern = AvuPattern::new("%", "%", Some("%"));
        let users: Vec<String> = self
            .sessions()
            .iter()
            .map(|session| session.username().to_owned())
            .collect();
        let removed = self.store.transact(|catalog| {
            let admin = catalog.actor(DEFAULT_ADMIN)?;
            let mut removed = 0;
            for user in &users {
                removed += catalog.remove_avus_matching(&admin, TargetKind::User, user, &pattern)?;
            }
            Ok(removed)
        })?;
        debug!(removed, "user metadata reset");
        Ok(removed)
    }
}

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;

use super::{render_json, report_error};
use crate::catalog::store::CatalogStore;
use crate::catalog::{Access, DEFAULT_ADMIN, DEFAULT_ZONE, UserKind};
use crate::config::{require_identity, resolve_catalog_path};
use crate::error::{CatalogError, StoreError};
use crate::output::{self, DomainOutcome};

/// Provision the catalog: users, collections and data objects.
#[derive(Debug, Parser)]
#[command(name = "icat", version, about)]
pub struct IcatCli {
    /// Identity to run as
    #[arg(long, global = true, env = "IMETA_USER")]
    pub user: Option<String>,

    /// Catalog file (default: ~/.imeta/catalog.json)
    #[arg(long, global = true, env = "IMETA_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: IcatCommand,
}

#[derive(Debug, Subcommand)]
pub enum IcatCommand {
    /// Create a new catalog with a zone and a bootstrap rodsadmin
    Init {
        #[arg(long, default_value = DEFAULT_ZONE)]
        zone: String,

        #[arg(long, default_value = DEFAULT_ADMIN)]
        admin: String,

        /// Replace an existing catalog
        #[arg(long)]
        force: bool,
    },

    /// Create a user and its home collection (rodsadmin only)
    Mkuser {
        name: String,

        /// rodsuser or rodsadmin
        #[arg(long = "type", default_value = "rodsuser")]
        kind: String,
    },

    /// List user names
    Lu,

    /// Create a collection
    Mkdir { collection: String },

    /// Register a local file as a data object
    Put {
        local: PathBuf,

        /// Object name or path (default: the local file name)
        name: Option<String>,

        /// Overwrite an existing data object
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// List a collection (default: the home collection)
    Ls { collection: Option<String> },

    /// Grant or revoke access: null, read, write or own
    Chmod {
        level: String,
        grantee: String,
        path: String,
    },
}

impl IcatCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "icat init",
            Self::Mkuser { .. } => "icat mkuser",
            Self::Lu => "icat lu",
            Self::Mkdir { .. } => "icat mkdir",
            Self::Put { .. } => "icat put",
            Self::Ls { .. } => "icat ls",
            Self::Chmod { .. } => "icat chmod",
        }
    }
}

pub fn run() -> u8 {
    let cli = IcatCli::parse();
    crate::logging::init();

    match execute(&cli) {
        Ok(stdout) => {
            print!("{stdout}");
            DomainOutcome::Success.exit_code()
        }
        Err(error) => report_error(cli.command.name(), cli.json, &error),
    }
}

/// Size and `blake3:` checksum of a local file.
fn fingerprint(local: &Path) -> Result<(u64, String), StoreError> {
    let io_error = |source: io::Error| StoreError::Io {
        path: local.to_path_buf(),
        source,
    };
    let file = File::open(local).map_err(io_error)?;
    let mut hasher = blake3::Hasher::new();
    let size = io::copy(&mut BufReader::new(file), &mut hasher).map_err(io_error)?;
    Ok((size, format!("blake3:{}", hasher.finalize().to_hex())))
}

/// Run one `icat` command, returning what it prints on stdout.
pub fn execute(cli: &IcatCli) -> Result<String, StoreError> {
    let store = CatalogStore::new(resolve_catalog_path(cli.catalog.as_deref()));

    if let IcatCommand::Init { zone, admin, force } = &cli.command {
        let catalog = store.init(zone, admin, *force)?;
        debug!(zone = %catalog.zone, "init");
        return Ok(String::new());
    }

    let identity = require_identity(cli.user.as_deref())?;
    match &cli.command {
        IcatCommand::Init { .. } => Ok(String::new()),
        IcatCommand::Mkuser { name, kind } => {
            let kind: UserKind = kind.parse()?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.create_user(&actor, name, kind)
            })?;
            Ok(String::new())
        }
        IcatCommand::Lu => {
            let names = store.read(|catalog| {
                catalog.actor(&identity)?;
                Ok(catalog.user_names())
            })?;
            if cli.json {
                render_json(&store, &names)
            } else {
                Ok(names.iter().map(|name| format!("{name}\n")).collect())
            }
        }
        IcatCommand::Mkdir { collection } => {
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.create_collection(&actor, collection)
            })?;
            Ok(String::new())
        }
        IcatCommand::Put { local, name, force } => {
            let name = match name {
                Some(name) => name.clone(),
                None => local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        CatalogError::InvalidArgument(format!(
                            "cannot derive an object name from {}",
                            local.display()
                        ))
                    })?,
            };
            let (size, checksum) = fingerprint(local)?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.register_data_object(&actor, &name, size, &checksum, *force)
            })?;
            Ok(String::new())
        }
        IcatCommand::Ls { collection } => {
            let listing = store.read(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.list_collection(&actor, collection.as_deref())
            })?;
            if cli.json {
                render_json(&store, &listing)
            } else {
                Ok(output::render_collection(&listing))
            }
        }
        IcatCommand::Chmod {
            level,
            grantee,
            path,
        } => {
            let level: Access = level.parse()?;
            store.transact(|catalog| {
                let actor = catalog.actor(&identity)?;
                catalog.set_access(&actor, level, grantee, path)
            })?;
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_defaults() {
        let cli = IcatCli::try_parse_from(["icat", "init"]).unwrap();
        match cli.command {
            IcatCommand::Init { zone, admin, force } => {
                assert_eq!(zone, "tempZone");
                assert_eq!(admin, "rods");
                assert!(!force);
            }
            other => panic!("expected Init, got {other:?}"),
        }
    }

    #[test]
    fn parse_mkuser_type() {
        let cli =
            IcatCli::try_parse_from(["icat", "mkuser", "carol", "--type", "rodsadmin"]).unwrap();
        match cli.command {
            IcatCommand::Mkuser { name, kind } => {
                assert_eq!(name, "carol");
                assert_eq!(kind, "rodsadmin");
            }
            other => panic!("expected Mkuser, got {other:?}"),
        }
    }

    #[test]
    fn parse_put_with_force() {
        let cli = IcatCli::try_parse_from(["icat", "put", "-f", "local.txt", "file_0"]).unwrap();
        match cli.command {
            IcatCommand::Put { local, name, force } => {
                assert_eq!(local, PathBuf::from("local.txt"));
                assert_eq!(name.as_deref(), Some("file_0"));
                assert!(force);
            }
            other => panic!("expected Put, got {other:?}"),
        }
    }

    #[test]
    fn fingerprint_hashes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testfile.txt");
        std::fs::write(&path, b"hello").unwrap();

        let (size, checksum) = fingerprint(&path).unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            checksum,
            format!("blake3:{}", blake3::hash(b"hello").to_hex())
        );
    }

    #[test]
    fn fingerprint_of_missing_file_is_io_error() {
        let err = fingerprint(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}

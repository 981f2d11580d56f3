use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::output::DomainOutcome;

/// Error envelope schema version, shared by every `--json` failure.
pub const ERROR_VERSION: &str = "imeta-error.v0";

/// Catalog error tokens.
///
/// Each code is the stable token printed on stderr; scenarios match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The session user lacks the ACL needed on a collection or data object.
    NoAccessPermission,
    /// A rodsuser attempted an admin-only operation.
    InsufficientPrivilegeLevel,
    /// A query or argument exceeds the length or bind-variable limits.
    StrlenTooLong,
    /// Malformed arguments (empty attribute, bad comparator, bad path).
    InvalidArgument,
    /// No user by that name.
    InvalidUser,
    /// No collection at that path.
    UnknownCollection,
    /// No data object at that path.
    UnknownFile,
    /// The operation matched nothing.
    NoRowsFound,
    /// The item (user, path, AVU) already exists.
    AlreadyExists,
    /// `put` onto an existing data object without `--force`.
    OverwriteWithoutForce,
    /// The catalog file could not be read, written or locked.
    CatalogIo,
}

impl ErrorCode {
    /// Wire token (e.g. `"CAT_NO_ACCESS_PERMISSION"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAccessPermission => "CAT_NO_ACCESS_PERMISSION",
            Self::InsufficientPrivilegeLevel => "CAT_INSUFFICIENT_PRIVILEGE_LEVEL",
            Self::StrlenTooLong => "USER_STRLEN_TOOLONG",
            Self::InvalidArgument => "CAT_INVALID_ARGUMENT",
            Self::InvalidUser => "CAT_INVALID_USER",
            Self::UnknownCollection => "CAT_UNKNOWN_COLLECTION",
            Self::UnknownFile => "CAT_UNKNOWN_FILE",
            Self::NoRowsFound => "CAT_NO_ROWS_FOUND",
            Self::AlreadyExists => "CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME",
            Self::OverwriteWithoutForce => "OVERWRITE_WITHOUT_FORCE_FLAG",
            Self::CatalogIo => "SYS_CATALOG_IO",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Errors raised by catalog operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("user '{user}' lacks {needed} access to {path}")]
    NoAccess { user: String, path: String, needed: &'static str },

    #[error("user '{user}' is not a rodsadmin")]
    NotAdmin { user: String },

    #[error("{what} has {len} {unit}, limit is {limit}")]
    TooLong {
        what: &'static str,
        len: usize,
        unit: &'static str,
        limit: usize,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("no such user '{0}'")]
    UnknownUser(String),

    #[error("no such collection {0}")]
    UnknownCollection(String),

    #[error("no such data object {0}")]
    UnknownDataObject(String),

    #[error("{0}")]
    NoRows(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("data object {0} exists; use --force to overwrite")]
    OverwriteWithoutForce(String),
}

impl CatalogError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoAccess { .. } => ErrorCode::NoAccessPermission,
            Self::NotAdmin { .. } => ErrorCode::InsufficientPrivilegeLevel,
            Self::TooLong { .. } => ErrorCode::StrlenTooLong,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::UnknownUser(_) => ErrorCode::InvalidUser,
            Self::UnknownCollection(_) => ErrorCode::UnknownCollection,
            Self::UnknownDataObject(_) => ErrorCode::UnknownFile,
            Self::NoRows(_) => ErrorCode::NoRowsFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::OverwriteWithoutForce(_) => ErrorCode::OverwriteWithoutForce,
        }
    }
}

/// Errors raised while loading or persisting the catalog document.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("catalog not initialized at {path}; run `icat init`")]
    NotInitialized { path: PathBuf },

    #[error("catalog already exists at {path}; pass --force to replace it")]
    AlreadyInitialized { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported catalog version \"{version}\" in {path}")]
    UnsupportedVersion { path: PathBuf, version: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Catalog(error) => error.code(),
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyExists,
            _ => ErrorCode::CatalogIo,
        }
    }

    /// Domain errors exit 1, storage failures exit 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Catalog(_) | Self::AlreadyInitialized { .. } => DomainOutcome::Refused,
            _ => DomainOutcome::Failed,
        }
        .exit_code()
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct ErrorEnvelope {
    version: &'static str,
    outcome: &'static str,
    error: ErrorBody,
}

/// Render a failure as a compact JSON envelope with sorted keys.
pub fn error_json(code: ErrorCode, message: &str) -> String {
    let envelope = ErrorEnvelope {
        version: ERROR_VERSION,
        outcome: "ERROR",
        error: ErrorBody {
            code,
            message: message.to_owned(),
        },
    };
    match serde_json::to_value(&envelope) {
        Ok(value) => serde_json::to_string(&sort_value(value)).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Render a failure as the human-readable stderr line.
pub fn error_line(operation: &str, code: ErrorCode, message: &str) -> String {
    format!("ERROR: {operation} failed with error {code}: {message}")
}

/// Recursively sort all object keys in a JSON value.
pub(crate) fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let btree: std::collections::BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            Value::Object(btree.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}

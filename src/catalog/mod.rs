//! The metadata catalog: users, collections, data objects, ACLs and AVUs.
//!
//! Everything here is in-memory and side-effect free; `store` handles
//! persistence and transactions.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::avu::{Avu, AvuPattern, AvuSet};
use crate::error::CatalogError;
use crate::wildcard::LikePattern;

pub mod path;
pub mod store;

/// Catalog document version.
pub const CATALOG_VERSION: &str = "imeta-catalog.v0";

pub const DEFAULT_ZONE: &str = "tempZone";
pub const DEFAULT_ADMIN: &str = "rods";

/// ACL levels, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Null,
    Read,
    Write,
    Own,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Read => "read",
            Self::Write => "write",
            Self::Own => "own",
        }
    }
}

impl std::str::FromStr for Access {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "null" => Ok(Self::Null),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "own" => Ok(Self::Own),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown access level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserKind {
    #[serde(rename = "rodsadmin")]
    RodsAdmin,
    #[serde(rename = "rodsuser")]
    RodsUser,
}

impl std::str::FromStr for UserKind {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "rodsadmin" => Ok(Self::RodsAdmin),
            "rodsuser" => Ok(Self::RodsUser),
            other => Err(CatalogError::InvalidArgument(format!(
                "unknown user type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub kind: UserKind,
    pub created: String,
    #[serde(default)]
    pub avus: AvuSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub owner: String,
    pub created: String,
    #[serde(default)]
    pub acl: BTreeMap<String, Access>,
    #[serde(default)]
    pub avus: AvuSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub owner: String,
    pub size: u64,
    pub checksum: String,
    pub created: String,
    #[serde(default)]
    pub acl: BTreeMap<String, Access>,
    #[serde(default)]
    pub avus: AvuSet,
}

/// Which kind of target an AVU operation addresses (`-u`, `-C`, `-d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    User,
    Collection,
    DataObject,
}

impl TargetKind {
    /// Noun used in listings (`AVUs defined for dataObj ...`).
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Collection => "collection",
            Self::DataObject => "dataObj",
        }
    }
}

/// The identity a command runs as, resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub is_admin: bool,
    pub home: String,
}

/// Attribute selection for listings.
#[derive(Debug, Clone)]
pub enum AttributeFilter {
    All,
    Exact(String),
    Like(LikePattern),
}

impl AttributeFilter {
    fn accepts(&self, avu: &Avu) -> bool {
        match self {
            Self::All => true,
            Self::Exact(attribute) => avu.attribute == *attribute,
            Self::Like(pattern) => pattern.matches(&avu.attribute),
        }
    }
}

/// AVUs visible on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvuListing {
    #[serde(skip)]
    pub kind: TargetKind,
    pub target: String,
    pub avus: Vec<Avu>,
}

/// Contents of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionListing {
    pub collection: String,
    pub data_objects: Vec<String>,
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    pub zone: String,
    pub admin: String,
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub collections: BTreeMap<String, Collection>,
    #[serde(default)]
    pub data_objects: BTreeMap<String, DataObject>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Catalog {
    /// A fresh catalog with the zone root, `/zone/home` and one admin.
    pub fn bootstrap(zone: &str, admin: &str) -> Self {
        let mut catalog = Self {
            version: CATALOG_VERSION.to_owned(),
            zone: zone.to_owned(),
            admin: admin.to_owned(),
            users: BTreeMap::new(),
            collections: BTreeMap::new(),
            data_objects: BTreeMap::new(),
        };
        for root in [format!("/{zone}"), format!("/{zone}/home")] {
            catalog.insert_collection(root, admin);
        }
        catalog.insert_user(admin, UserKind::RodsAdmin);
        catalog
    }

    fn insert_collection(&mut self, path: String, owner: &str) {
        self.collections.insert(
            path,
            Collection {
                owner: owner.to_owned(),
                created: now(),
                acl: BTreeMap::new(),
                avus: AvuSet::default(),
            },
        );
    }

    fn insert_user(&mut self, name: &str, kind: UserKind) {
        self.users.insert(
            name.to_owned(),
            User {
                kind,
                created: now(),
                avus: AvuSet::default(),
            },
        );
        let home = path::home_collection(&self.zone, name);
        self.insert_collection(home, name);
    }

    // -----------------------------------------------------------------------
    // Identity and target resolution
    // -----------------------------------------------------------------------

    pub fn actor(&self, name: &str) -> Result<Actor, CatalogError> {
        let name = self.strip_zone(name);
        let user = self
            .users
            .get(name)
            .ok_or_else(|| CatalogError::UnknownUser(name.to_owned()))?;
        Ok(Actor {
            name: name.to_owned(),
            is_admin: user.kind == UserKind::RodsAdmin,
            home: path::home_collection(&self.zone, name),
        })
    }

    /// Accept both `alice` and `alice#tempZone`.
    fn strip_zone<'a>(&self, name: &'a str) -> &'a str {
        match name.split_once('#') {
            Some((user, zone)) if zone == self.zone => user,
            _ => name,
        }
    }

    /// Resolve a target argument to its catalog key, checking it exists.
    pub fn resolve_target(
        &self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
    ) -> Result<String, CatalogError> {
        match kind {
            TargetKind::User => {
                let user = self.strip_zone(name);
                if self.users.contains_key(user) {
                    Ok(user.to_owned())
                } else {
                    Err(CatalogError::UnknownUser(user.to_owned()))
                }
            }
            TargetKind::Collection => {
                let path = path::resolve(&actor.home, name)?;
                if self.collections.contains_key(&path) {
                    Ok(path)
                } else {
                    Err(CatalogError::UnknownCollection(path))
                }
            }
            TargetKind::DataObject => {
                let path = path::resolve(&actor.home, name)?;
                if self.data_objects.contains_key(&path) {
                    Ok(path)
                } else {
                    Err(CatalogError::UnknownDataObject(path))
                }
            }
        }
    }

    pub fn display_name(&self, kind: TargetKind, key: &str) -> String {
        match kind {
            TargetKind::User => format!("{key}#{}", self.zone),
            _ => key.to_owned(),
        }
    }

    pub fn avus(&self, kind: TargetKind, key: &str) -> Option<&AvuSet> {
        match kind {
            TargetKind::User => self.users.get(key).map(|u| &u.avus),
            TargetKind::Collection => self.collections.get(key).map(|c| &c.avus),
            TargetKind::DataObject => self.data_objects.get(key).map(|d| &d.avus),
        }
    }

    fn avus_mut(&mut self, kind: TargetKind, key: &str) -> Result<&mut AvuSet, CatalogError> {
        let found = match kind {
            TargetKind::User => self.users.get_mut(key).map(|u| &mut u.avus),
            TargetKind::Collection => self.collections.get_mut(key).map(|c| &mut c.avus),
            TargetKind::DataObject => self.data_objects.get_mut(key).map(|d| &mut d.avus),
        };
        found.ok_or_else(|| match kind {
            TargetKind::User => CatalogError::UnknownUser(key.to_owned()),
            TargetKind::Collection => CatalogError::UnknownCollection(key.to_owned()),
            TargetKind::DataObject => CatalogError::UnknownDataObject(key.to_owned()),
        })
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    /// Effective ACL of `user` on a collection or data object path.
    pub fn access_of(&self, user: &str, kind: TargetKind, key: &str) -> Access {
        let (owner, acl) = match kind {
            TargetKind::Collection => match self.collections.get(key) {
                Some(c) => (&c.owner, &c.acl),
                None => return Access::Null,
            },
            TargetKind::DataObject => match self.data_objects.get(key) {
                Some(d) => (&d.owner, &d.acl),
                None => return Access::Null,
            },
            TargetKind::User => return Access::Null,
        };
        if owner == user {
            return Access::Own;
        }
        acl.get(user).copied().unwrap_or(Access::Null)
    }

    fn require_access(
        &self,
        actor: &Actor,
        kind: TargetKind,
        key: &str,
        needed: Access,
    ) -> Result<(), CatalogError> {
        if self.access_of(&actor.name, kind, key) >= needed {
            Ok(())
        } else {
            Err(CatalogError::NoAccess {
                user: actor.name.clone(),
                path: key.to_owned(),
                needed: needed.as_str(),
            })
        }
    }

    fn require_admin(actor: &Actor) -> Result<(), CatalogError> {
        if actor.is_admin {
            Ok(())
        } else {
            Err(CatalogError::NotAdmin {
                user: actor.name.clone(),
            })
        }
    }

    /// Modifying user AVUs needs rodsadmin; everything else needs `write`.
    pub fn check_modify(
        &self,
        actor: &Actor,
        kind: TargetKind,
        key: &str,
    ) -> Result<(), CatalogError> {
        match kind {
            TargetKind::User => Self::require_admin(actor),
            _ => self.require_access(actor, kind, key, Access::Write),
        }
    }

    /// User AVUs are public; admins read everything.
    pub fn can_read(&self, actor: &Actor, kind: TargetKind, key: &str) -> bool {
        kind == TargetKind::User
            || actor.is_admin
            || self.access_of(&actor.name, kind, key) >= Access::Read
    }

    // -----------------------------------------------------------------------
    // AVU operations
    // -----------------------------------------------------------------------

    pub fn set_avu(
        &mut self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
        avu: Avu,
    ) -> Result<(), CatalogError> {
        let key = self.resolve_target(actor, kind, name)?;
        self.check_modify(actor, kind, &key)?;
        debug!(target_key = %key, attribute = %avu.attribute, "set AVU");
        self.avus_mut(kind, &key)?.set(avu);
        Ok(())
    }

    pub fn add_avu(
        &mut self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
        avu: Avu,
    ) -> Result<(), CatalogError> {
        let key = self.resolve_target(actor, kind, name)?;
        self.check_modify(actor, kind, &key)?;
        debug!(target_key = %key, attribute = %avu.attribute, "add AVU");
        self.avus_mut(kind, &key)?.add(avu)
    }

    pub fn remove_avu(
        &mut self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
        avu: &Avu,
    ) -> Result<(), CatalogError> {
        let key = self.resolve_target(actor, kind, name)?;
        self.check_modify(actor, kind, &key)?;
        debug!(target_key = %key, attribute = %avu.attribute, "remove AVU");
        self.avus_mut(kind, &key)?.remove(avu)
    }

    pub fn remove_avus_matching(
        &mut self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
        pattern: &AvuPattern,
    ) -> Result<usize, CatalogError> {
        let key = self.resolve_target(actor, kind, name)?;
        self.check_modify(actor, kind, &key)?;
        let removed = self.avus_mut(kind, &key)?.remove_matching(pattern);
        debug!(target_key = %key, removed, "remove AVUs by pattern");
        Ok(removed)
    }

    /// Add `avu` to every data object matching `wildcard`.
    ///
    /// All-or-nothing: a single object without `write` access fails the
    /// whole call. Objects already carrying the identical AVU are skipped.
    pub fn add_avu_wildcard(
        &mut self,
        actor: &Actor,
        wildcard: &str,
        avu: &Avu,
    ) -> Result<usize, CatalogError> {
        let resolved = path::resolve(&actor.home, wildcard)?;
        let (collection_part, name_part) = path::split(&resolved).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("wildcard has no object name: {wildcard}"))
        })?;
        let collection_pattern = LikePattern::new(collection_part);
        let name_pattern = LikePattern::new(name_part);

        let matched: Vec<String> = self
            .data_objects
            .keys()
            .filter(|key| {
                path::split(key).is_some_and(|(collection, name)| {
                    collection_pattern.matches(collection) && name_pattern.matches(name)
                })
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            return Err(CatalogError::NoRows(format!(
                "no data objects match {resolved}"
            )));
        }
        for key in &matched {
            self.require_access(actor, TargetKind::DataObject, key, Access::Write)?;
        }

        let mut added = 0;
        for key in &matched {
            let avus = self.avus_mut(TargetKind::DataObject, key)?;
            if avus.contains(avu) {
                continue;
            }
            avus.add(avu.clone())?;
            added += 1;
        }
        debug!(pattern = %resolved, matched = matched.len(), added, "bulk add AVU");
        Ok(added)
    }

    pub fn list_avus(
        &self,
        actor: &Actor,
        kind: TargetKind,
        name: &str,
        filter: &AttributeFilter,
    ) -> Result<AvuListing, CatalogError> {
        let key = self.resolve_target(actor, kind, name)?;
        if !self.can_read(actor, kind, &key) {
            return Err(CatalogError::NoAccess {
                user: actor.name.clone(),
                path: key,
                needed: Access::Read.as_str(),
            });
        }
        let avus = self
            .avus(kind, &key)
            .map(|set| set.iter().filter(|avu| filter.accepts(avu)).cloned().collect())
            .unwrap_or_default();
        Ok(AvuListing {
            kind,
            target: self.display_name(kind, &key),
            avus,
        })
    }

    // -----------------------------------------------------------------------
    // Provisioning
    // -----------------------------------------------------------------------

    pub fn create_user(
        &mut self,
        actor: &Actor,
        name: &str,
        kind: UserKind,
    ) -> Result<(), CatalogError> {
        Self::require_admin(actor)?;
        if name.is_empty() || name.contains(['/', '#']) || name.chars().any(char::is_whitespace) {
            return Err(CatalogError::InvalidArgument(format!(
                "invalid user name '{name}'"
            )));
        }
        if self.users.contains_key(name) {
            return Err(CatalogError::AlreadyExists(format!("user '{name}'")));
        }
        debug!(user = name, "create user");
        self.insert_user(name, kind);
        Ok(())
    }

    pub fn user_names(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    fn require_new_path(&self, path: &str) -> Result<(), CatalogError> {
        if self.collections.contains_key(path) || self.data_objects.contains_key(path) {
            return Err(CatalogError::AlreadyExists(path.to_owned()));
        }
        Ok(())
    }

    fn writable_parent<'a>(&self, actor: &Actor, path: &'a str) -> Result<&'a str, CatalogError> {
        let (parent, _) = path::split(path)
            .ok_or_else(|| CatalogError::InvalidArgument(format!("no parent for {path}")))?;
        if !self.collections.contains_key(parent) {
            return Err(CatalogError::UnknownCollection(parent.to_owned()));
        }
        self.require_access(actor, TargetKind::Collection, parent, Access::Write)?;
        Ok(parent)
    }

    pub fn create_collection(&mut self, actor: &Actor, name: &str) -> Result<String, CatalogError> {
        let path = path::resolve(&actor.home, name)?;
        self.require_new_path(&path)?;
        self.writable_parent(actor, &path)?;
        debug!(collection = %path, "create collection");
        self.insert_collection(path.clone(), &actor.name);
        Ok(path)
    }

    /// Register a data object. `force` replaces an existing object the
    /// actor can write, keeping its AVUs and ACL.
    pub fn register_data_object(
        &mut self,
        actor: &Actor,
        name: &str,
        size: u64,
        checksum: &str,
        force: bool,
    ) -> Result<String, CatalogError> {
        let path = path::resolve(&actor.home, name)?;
        if self.collections.contains_key(&path) {
            return Err(CatalogError::AlreadyExists(path));
        }
        if self.data_objects.contains_key(&path) {
            if !force {
                return Err(CatalogError::OverwriteWithoutForce(path));
            }
            self.require_access(actor, TargetKind::DataObject, &path, Access::Write)?;
            if let Some(object) = self.data_objects.get_mut(&path) {
                object.size = size;
                object.checksum = checksum.to_owned();
            }
            return Ok(path);
        }
        self.writable_parent(actor, &path)?;
        debug!(data_object = %path, size, "register data object");
        self.data_objects.insert(
            path.clone(),
            DataObject {
                owner: actor.name.clone(),
                size,
                checksum: checksum.to_owned(),
                created: now(),
                acl: BTreeMap::new(),
                avus: AvuSet::default(),
            },
        );
        Ok(path)
    }

    pub fn list_collection(
        &self,
        actor: &Actor,
        name: Option<&str>,
    ) -> Result<CollectionListing, CatalogError> {
        let path = match name {
            Some(name) => path::resolve(&actor.home, name)?,
            None => actor.home.clone(),
        };
        if !self.collections.contains_key(&path) {
            return Err(CatalogError::UnknownCollection(path));
        }
        if !self.can_read(actor, TargetKind::Collection, &path) {
            return Err(CatalogError::NoAccess {
                user: actor.name.clone(),
                path,
                needed: Access::Read.as_str(),
            });
        }
        let child_of = |key: &&String| path::split(key).is_some_and(|(parent, _)| parent == path);
        Ok(CollectionListing {
            data_objects: self
                .data_objects
                .keys()
                .filter(child_of)
                .filter_map(|key| path::split(key).map(|(_, leaf)| leaf.to_owned()))
                .collect(),
            collections: self.collections.keys().filter(child_of).cloned().collect(),
            collection: path,
        })
    }

    /// Grant (or with `Access::Null`, revoke) `user`'s access to a path.
    pub fn set_access(
        &mut self,
        actor: &Actor,
        level: Access,
        user: &str,
        name: &str,
    ) -> Result<(), CatalogError> {
        let user = self.strip_zone(user).to_owned();
        if !self.users.contains_key(&user) {
            return Err(CatalogError::UnknownUser(user));
        }
        let path = path::resolve(&actor.home, name)?;
        let kind = if self.collections.contains_key(&path) {
            TargetKind::Collection
        } else if self.data_objects.contains_key(&path) {
            TargetKind::DataObject
        } else {
            return Err(CatalogError::UnknownDataObject(path));
        };
        self.require_access(actor, kind, &path, Access::Own)?;

        let acl = match kind {
            TargetKind::Collection => self.collections.get_mut(&path).map(|c| &mut c.acl),
            _ => self.data_objects.get_mut(&path).map(|d| &mut d.acl),
        };
        if let Some(acl) = acl {
            if level == Access::Null {
                acl.remove(&user);
            } else {
                acl.insert(user.clone(), level);
            }
        }
        debug!(path = %path, user = %user, level = level.as_str(), "set access");
        Ok(())
    }
}

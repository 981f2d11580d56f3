use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::wildcard::LikePattern;

/// An attribute-value-unit triple. An empty `units` makes it a "double".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avu {
    pub attribute: String,
    pub value: String,
    #[serde(default)]
    pub units: String,
}

impl Avu {
    pub fn new(attribute: &str, value: &str, units: Option<&str>) -> Result<Self, CatalogError> {
        if attribute.trim().is_empty() {
            return Err(CatalogError::InvalidArgument(
                "attribute must not be empty".to_owned(),
            ));
        }
        if value.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "value must not be empty".to_owned(),
            ));
        }
        Ok(Self {
            attribute: attribute.to_owned(),
            value: value.to_owned(),
            units: units.unwrap_or_default().to_owned(),
        })
    }

    pub fn is_triple(&self) -> bool {
        !self.units.is_empty()
    }
}

/// An AVU as stored on a target, with bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAvu {
    #[serde(flatten)]
    pub avu: Avu,
    pub created: String,
    pub modified: String,
}

impl StoredAvu {
    fn stamp(avu: Avu) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            avu,
            created: now.clone(),
            modified: now,
        }
    }
}

/// Observable form of one attribute on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeState {
    Absent,
    Double,
    Triple,
}

/// Field patterns for `rmw` and `lsw`.
#[derive(Debug, Clone)]
pub struct AvuPattern {
    pub attribute: LikePattern,
    pub value: LikePattern,
    pub units: LikePattern,
}

impl AvuPattern {
    /// An omitted units pattern only matches empty units.
    pub fn new(attribute: &str, value: &str, units: Option<&str>) -> Self {
        Self {
            attribute: LikePattern::new(attribute),
            value: LikePattern::new(value),
            units: LikePattern::new(units.unwrap_or_default()),
        }
    }

    pub fn matches(&self, avu: &Avu) -> bool {
        self.attribute.matches(&avu.attribute)
            && self.value.matches(&avu.value)
            && self.units.matches(&avu.units)
    }
}

/// The ordered AVUs attached to a single target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvuSet {
    entries: Vec<StoredAvu>,
}

impl AvuSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Avu> {
        self.entries.iter().map(|entry| &entry.avu)
    }

    pub fn contains(&self, avu: &Avu) -> bool {
        self.iter().any(|existing| existing == avu)
    }

    pub fn with_attribute<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a Avu> {
        self.iter().filter(move |avu| avu.attribute == attribute)
    }

    pub fn state_of(&self, attribute: &str) -> AttributeState {
        let mut state = AttributeState::Absent;
        for avu in self.with_attribute(attribute) {
            if avu.is_triple() {
                return AttributeState::Triple;
            }
            state = AttributeState::Double;
        }
        state
    }

    /// Replace every AVU carrying `avu.attribute` with `avu`.
    pub fn set(&mut self, avu: Avu) {
        let created = self
            .entries
            .iter()
            .find(|entry| entry.avu.attribute == avu.attribute)
            .map(|entry| entry.created.clone());
        self.entries
            .retain(|entry| entry.avu.attribute != avu.attribute);
        let mut stored = StoredAvu::stamp(avu);
        if let Some(created) = created {
            stored.created = created;
        }
        self.entries.push(stored);
    }

    /// Append `avu`; an identical AVU already present is rejected.
    pub fn add(&mut self, avu: Avu) -> Result<(), CatalogError> {
        if self.contains(&avu) {
            return Err(CatalogError::AlreadyExists(format!(
                "AVU ({}, {}, {})",
                avu.attribute, avu.value, avu.units
            )));
        }
        self.entries.push(StoredAvu::stamp(avu));
        Ok(())
    }

    /// Remove the exact triple.
    pub fn remove(&mut self, avu: &Avu) -> Result<(), CatalogError> {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.avu != *avu);
        if self.entries.len() == before {
            return Err(CatalogError::NoRows(format!(
                "no AVU ({}, {}, {}) on target",
                avu.attribute, avu.value, avu.units
            )));
        }
        Ok(())
    }

    /// Remove every AVU matching `pattern`, returning how many went.
    pub fn remove_matching(&mut self, pattern: &AvuPattern) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !pattern.matches(&entry.avu));
        before - self.entries.len()
    }
}

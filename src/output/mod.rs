use crate::catalog::{AvuListing, CollectionListing};
use crate::error::sort_value;
use crate::query::QueryHit;

/// Separator between AVU blocks and query rows.
pub const BLOCK_SEPARATOR: &str = "----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainOutcome {
    Success,
    Refused,
    Failed,
}

impl DomainOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Refused => 1,
            Self::Failed => 2,
        }
    }
}

/// Render `imeta ls` text.
///
/// ```text
/// AVUs defined for user alice#tempZone:
/// attribute: att0
/// value: val0
/// units: unt0
/// ```
pub fn render_listing(listing: &AvuListing) -> String {
    let mut out = format!(
        "AVUs defined for {} {}:\n",
        listing.kind.label(),
        listing.target
    );
    if listing.avus.is_empty() {
        out.push_str("None\n");
        return out;
    }
    for (index, avu) in listing.avus.iter().enumerate() {
        if index > 0 {
            out.push_str(BLOCK_SEPARATOR);
            out.push('\n');
        }
        out.push_str(&format!("attribute: {}\n", avu.attribute));
        out.push_str(&format!("value: {}\n", avu.value));
        out.push_str(&format!("units: {}\n", avu.units));
    }
    out
}

/// Render `imeta qu` text.
pub fn render_query_hits(hits: &[QueryHit]) -> String {
    if hits.is_empty() {
        return "No rows found\n".to_owned();
    }
    let mut out = String::new();
    for (index, hit) in hits.iter().enumerate() {
        if index > 0 {
            out.push_str(BLOCK_SEPARATOR);
            out.push('\n');
        }
        match hit {
            QueryHit::User { user } => out.push_str(&format!("user: {user}\n")),
            QueryHit::Collection { collection } => {
                out.push_str(&format!("collection: {collection}\n"));
            }
            QueryHit::DataObject {
                collection,
                data_object,
            } => {
                out.push_str(&format!("collection: {collection}\n"));
                out.push_str(&format!("dataObj: {data_object}\n"));
            }
        }
    }
    out
}

/// Render `icat ls` text: the collection, its objects, then sub-collections.
pub fn render_collection(listing: &CollectionListing) -> String {
    let mut out = format!("{}:\n", listing.collection);
    for name in &listing.data_objects {
        out.push_str(&format!("  {name}\n"));
    }
    for path in &listing.collections {
        out.push_str(&format!("  C- {path}\n"));
    }
    out
}

pub fn render_addw(count: usize) -> String {
    format!("AVU added to {count} data-objects\n")
}

/// Compact JSON with sorted keys, no trailing newline.
pub fn to_sorted_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&sort_value(value))
}

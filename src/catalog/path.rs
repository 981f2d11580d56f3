use crate::error::CatalogError;

/// Resolve `name` against `cwd` into a normalised absolute logical path.
pub fn resolve(cwd: &str, name: &str) -> Result<String, CatalogError> {
    if name.is_empty() {
        return Err(CatalogError::InvalidArgument("empty path".to_owned()));
    }
    let joined = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("{cwd}/{name}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(CatalogError::InvalidArgument(format!(
                        "path escapes the zone root: {name}"
                    )));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(CatalogError::InvalidArgument(format!(
            "path resolves to the root: {name}"
        )));
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Split an absolute path into `(parent collection, leaf name)`.
pub fn split(path: &str) -> Option<(&str, &str)> {
    let index = path.rfind('/')?;
    let leaf = &path[index + 1..];
    if leaf.is_empty() || index == 0 {
        return None;
    }
    Some((&path[..index], leaf))
}

pub fn home_collection(zone: &str, user: &str) -> String {
    format!("/{zone}/home/{user}")
}

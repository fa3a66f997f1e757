//! Helpers for the `/`-separated object names used by backends.

/// Normalize a name: leading `/`, no trailing or doubled `/`, root is `/`.
pub fn normalize(name: &str) -> String {
    let parts: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Parent of a normalized name, `None` for the root.
pub fn parent(name: &str) -> Option<&str> {
    if name == "/" {
        return None;
    }
    match name.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&name[..idx]),
        None => Some("/"),
    }
}

/// Last component of a normalized name (`""` for the root).
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or_default()
}

/// Append a child name to a directory name.
pub fn join(dir: &str, child: &str) -> String {
    if dir == "/" || dir.is_empty() {
        format!("/{child}")
    } else {
        format!("{}/{child}", dir.trim_end_matches('/'))
    }
}

/// Returns true when `name` is `ancestor` or lies below it.
pub fn is_within(name: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    name == ancestor
        || name
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

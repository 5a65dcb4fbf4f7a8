//! Route path joining and template normalization.

/// Join a router prefix with a relative route path.
///
/// Duplicate slashes collapse and a trailing slash on `relative` is kept, so
/// `/users/` and `/users` stay distinct routes.
pub fn join_paths(prefix: &str, relative: &str) -> String {
    if relative.is_empty() {
        return clean(prefix);
    }
    let joined = clean(&format!("{prefix}/{relative}"));
    if relative.ends_with('/') && !joined.ends_with('/') {
        joined + "/"
    } else {
        joined
    }
}

/// Collapse repeated slashes and resolve `.`/`..` segments. Always rooted.
fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Rewrite `:name` and `*name` segments into `{name}` and `{*name}`.
///
/// Templates already in brace form pass through unchanged.
pub fn normalize_template(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*').filter(|n| !n.is_empty()) {
                format!("{{*{name}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// The same path with its trailing slash added or removed. `None` for `/`.
pub fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" || path.is_empty() {
        None
    } else if let Some(stripped) = path.strip_suffix('/') {
        Some(stripped.to_string())
    } else {
        Some(format!("{path}/"))
    }
}

//! Lookup-name normalisation shared by the index builder and `get`.

use std::path::Path;

/// Convert a name to its word-separated lowercase form.
///
/// `UserProfile` becomes `user_profile` and `HTTPServer` becomes
/// `http_server`. Path separators are kept, so `Admin/UserList` becomes
/// `admin/user_list`.
#[must_use]
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Split `name.ext` into `("name", "ext")`.
///
/// Only the final component is considered, so `a.b/c` has no extension.
#[must_use]
pub fn split_ext(path: &str) -> (&str, &str) {
    let base_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[base_start..].rfind('.') {
        Some(dot) => {
            let dot = base_start + dot;
            (&path[..dot], &path[dot + 1..])
        }
        None => (path, ""),
    }
}

/// Relative path rendered with `/` separators regardless of platform.
pub(crate) fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lookup key for a file relative to its template root: `(name, format)`.
pub(crate) fn template_key(rel: &Path) -> (String, String) {
    let rel = slash_path(rel);
    let (name, ext) = split_ext(&rel);
    (to_snake_case(name), ext.to_string())
}

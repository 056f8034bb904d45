//! Path and module-id helpers.
//!
//! - Module-id query parsing (`?original`, `?vue&…` sub-requests)
//! - Lexical path normalization and relative-import resolution
//! - Root-relative manifest keys
//! - Injective export-name escaping for the server entry

use std::path::Path;

use crate::plugin::request::CUSTOM_ELEMENT_ID;

/// File extension recognized as a component source.
pub const COMPONENT_EXT: &str = ".vue";

/// Check whether a path names a component file (query stripped first).
pub fn is_component_file(id: &str) -> bool {
    parse_id(id).file_name.ends_with(COMPONENT_EXT)
}

// ---------------------------------------------------------------------------
// Id Query Parsing
// ---------------------------------------------------------------------------

/// Query flags carried on a module id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdQuery {
    /// `?original` — the raw component source, bypassing wrapper redirection.
    pub original: bool,
    /// `?vue…` — a compiler sub-request (style/template block), never ours.
    pub vue: bool,
}

/// A module id split into its file part and query flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedId<'a> {
    pub file_name: &'a str,
    pub query: IdQuery,
}

/// Split an id at the first `?` and read the flags atoll cares about.
pub fn parse_id(id: &str) -> ParsedId<'_> {
    let (file_name, search) = match id.split_once('?') {
        Some((f, s)) => (f, Some(s)),
        None => (id, None),
    };

    let mut query = IdQuery::default();
    if let Some(search) = search {
        for pair in search.split('&') {
            let key = pair.split('=').next().unwrap_or(pair);
            match key {
                "original" => query.original = true,
                "vue" => query.vue = true,
                _ => {}
            }
        }
    }

    ParsedId { file_name, query }
}

// ---------------------------------------------------------------------------
// Lexical Path Handling
// ---------------------------------------------------------------------------

/// Normalize a path lexically: forward slashes, no `.` segments, `..`
/// collapsed where a parent segment exists. No filesystem access.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&p) if p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Resolve an import specifier against its importer. Relative specifiers are
/// joined to the importer's directory; absolute ones are normalized as-is.
/// Bare specifiers (packages) return `None` — they are never component files
/// on disk.
pub fn resolve_import(importer: &str, specifier: &str) -> Option<String> {
    if specifier.starts_with('/') {
        return Some(normalize(specifier));
    }
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return None;
    }

    let importer_file = parse_id(importer).file_name;
    let dir = match importer_file.rfind('/') {
        Some(idx) => &importer_file[..idx],
        None => "",
    };
    Some(normalize(&format!("{dir}/{specifier}")))
}

/// The manifest key for a module id: the path relative to the project root.
/// The bootstrap element module has no on-disk path and keys as itself.
pub fn manifest_key(root: &Path, id: &str) -> String {
    if id == CUSTOM_ELEMENT_ID {
        return id.to_string();
    }

    let id = normalize(parse_id(id).file_name);
    let root = normalize(&root.to_string_lossy());
    let prefix = if root.ends_with('/') {
        root.clone()
    } else {
        format!("{root}/")
    };

    match id.strip_prefix(&prefix) {
        Some(rel) => rel.to_string(),
        None => id,
    }
}

// ---------------------------------------------------------------------------
// Export Name Escaping
// ---------------------------------------------------------------------------

/// Convert a root-relative component path to a server-entry export name.
///
/// Alphanumerics are preserved, `/` maps to `_`, and every other character is
/// hex-escaped between `$` markers. The encoding is decodable, so two
/// distinct paths can never produce the same export name.
pub fn export_name(relative_path: &str) -> String {
    let stripped = relative_path
        .trim_start_matches('/')
        .strip_suffix(COMPONENT_EXT)
        .unwrap_or(relative_path.trim_start_matches('/'));

    let mut out = String::with_capacity(stripped.len() + 1);
    out.push('_');
    for ch in stripped.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(ch),
            '/' => out.push('_'),
            other => {
                out.push('$');
                for unit in other.to_string().bytes() {
                    out.push_str(&format!("{unit:02x}"));
                }
                out.push('$');
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

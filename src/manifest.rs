//! Component-to-asset manifest.
//!
//! One interface, two implementations. Dev answers every query from live
//! source inspection and returns on-demand module paths the dev server can
//! serve directly. Build answers from tables persisted after the client
//! phases ran, pointing at content-hashed output files. Both prepend the
//! same public-base logic so asset URLs survive non-root deployments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::paths::{is_component_file, normalize};
use crate::plugin::request::{CUSTOM_ELEMENT_ID, CUSTOM_ELEMENT_PUBLIC_PATH};
use crate::sfc;
use crate::{AtollError, BuildMode, ResolvedAtollConfig};

/// File name of the persisted manifest, under the server output directory.
pub const MANIFEST_FILE_NAME: &str = "atoll-manifest.json";

/// Construct the manifest implementation a config's build mode calls for:
/// live source inspection in dev, the persisted artifact in production.
pub fn manifest_for(config: &ResolvedAtollConfig) -> Result<Box<dyn AssetManifest>, AtollError> {
    match config.mode {
        BuildMode::Dev => Ok(Box::new(DevManifest::new(
            &config.base,
            config.origin.as_deref(),
            false,
        ))),
        BuildMode::Prod => Ok(Box::new(BuildManifest::load(
            &config.server_out_dir,
            &config.base,
        )?)),
    }
}

// ---------------------------------------------------------------------------
// Manifest Interface
// ---------------------------------------------------------------------------

/// Resolves a component (by root-relative key) to its client assets.
pub trait AssetManifest {
    /// The module id the browser should load for this component's client code.
    fn client_import_id(&self, key: &str) -> Result<String, AtollError>;

    /// The stylesheet ids this component depends on. `source` is the
    /// component's source text; only the dev implementation reads it.
    fn stylesheet_ids(&self, key: &str, source: &str) -> Result<Vec<String>, AtollError>;
}

// ---------------------------------------------------------------------------
// Persisted Artifact
// ---------------------------------------------------------------------------

/// The manifest artifact written once per production build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestData {
    /// Root-relative component path → its emitted stylesheet ids.
    pub css_map: BTreeMap<String, Vec<String>>,
    /// Stylesheets pulled in via the aggregate client entry.
    pub entry_css: Vec<String>,
    /// Root-relative component path → hashed client chunk file name.
    pub js_map: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Dev Manifest
// ---------------------------------------------------------------------------

/// Dev-mode manifest: ids are derived from source on every call.
#[derive(Debug, Clone)]
pub struct DevManifest {
    serve_prefix: String,
    is_production: bool,
}

impl DevManifest {
    /// `base` as in the pipeline config (path or full URL); `origin` is the
    /// dev server origin, prepended when present.
    pub fn new(base: &str, origin: Option<&str>, is_production: bool) -> Self {
        let origin = origin.map_or(String::new(), |o| o.trim_end_matches('/').to_string());
        Self {
            serve_prefix: format!("{origin}{}", base_path_for_dev(base)),
            is_production,
        }
    }
}

impl AssetManifest for DevManifest {
    fn client_import_id(&self, key: &str) -> Result<String, AtollError> {
        if key == CUSTOM_ELEMENT_ID {
            return Ok(format!("{}{CUSTOM_ELEMENT_PUBLIC_PATH}", self.serve_prefix));
        }
        Ok(format!("{}/{key}", self.serve_prefix))
    }

    fn stylesheet_ids(&self, key: &str, source: &str) -> Result<Vec<String>, AtollError> {
        if !is_component_file(key) {
            return Ok(Vec::new());
        }

        let descriptor = sfc::parse(source);
        let scope_id = component_id(key, source, self.is_production);

        descriptor
            .styles
            .iter()
            .map(|style| {
                if style.src.is_some() {
                    return Err(AtollError::ExternalStyleSource {
                        path: key.to_string(),
                    });
                }
                if style.scoped && style.module {
                    return Err(AtollError::ScopedModuleStyle {
                        path: key.to_string(),
                    });
                }

                let scoped_query = if style.scoped {
                    format!("&scoped={scope_id}")
                } else {
                    String::new()
                };
                let attrs_query = attrs_to_query(&style.attrs, "css");

                let mut style_id =
                    format!("/{key}?vue&type=style&index={}{scoped_query}{attrs_query}", style.index);

                if style.module {
                    style_id = inject_module_marker(&style_id);
                }

                Ok(format!("{}{style_id}", self.serve_prefix))
            })
            .collect()
    }
}

/// The path component of the public base, no trailing slash.
fn base_path_for_dev(base: &str) -> String {
    let path = match base.find("://") {
        Some(idx) => {
            let rest = &base[idx + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "",
            }
        }
        None => base,
    };
    path.trim_end_matches('/').to_string()
}

/// Inject `.module` before the final extension so the pipeline treats the
/// style request as a CSS module.
fn inject_module_marker(style_id: &str) -> String {
    match style_id.rfind('.') {
        Some(idx)
            if !style_id[idx + 1..].is_empty()
                && style_id[idx + 1..].chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{}.module{}", &style_id[..idx], &style_id[idx..])
        }
        _ => style_id.to_string(),
    }
}

// These are built-in query parameters, ignored if a style block happens to
// carry them as attributes.
const QUERY_IGNORE_LIST: &[&str] = &[
    "id", "index", "src", "type", "lang", "module", "scoped", "generic",
];

fn attrs_to_query(attrs: &[(String, Option<String>)], lang_fallback: &str) -> String {
    let mut query = String::new();

    for (name, value) in attrs {
        if QUERY_IGNORE_LIST.contains(&name.as_str()) {
            continue;
        }
        query.push('&');
        query.push_str(&encode_uri_component(name));
        if let Some(value) = value {
            if !value.is_empty() {
                query.push('=');
                query.push_str(&encode_uri_component(value));
            }
        }
    }

    let lang = attrs
        .iter()
        .find(|(n, _)| n == "lang")
        .and_then(|(_, v)| v.as_deref())
        .unwrap_or(lang_fallback);
    query.push_str(&format!("&lang.{lang}"));

    query
}

fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(byte as char),
            b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Component Identity
// ---------------------------------------------------------------------------

/// Short identity hash for a component, used to key scoped styles. In
/// production the source participates, so edits re-key the scope.
pub fn component_id(key: &str, source: &str, is_production: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(key).as_bytes());
    if is_production {
        hasher.update(source.as_bytes());
    }
    let digest = hasher.finalize();
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

// ---------------------------------------------------------------------------
// Build Manifest
// ---------------------------------------------------------------------------

/// Build-mode manifest backed by the persisted artifact.
#[derive(Debug, Clone)]
pub struct BuildManifest {
    data: ManifestData,
    base_path: String,
}

impl BuildManifest {
    pub fn new(data: ManifestData, base: &str) -> Self {
        Self {
            data,
            base_path: base.trim_end_matches('/').to_string(),
        }
    }

    /// Read the artifact from the server output directory.
    pub fn load(server_out_dir: &Path, base: &str) -> Result<Self, AtollError> {
        let path = manifest_path(server_out_dir);
        let raw = std::fs::read_to_string(&path)?;
        Ok(Self::new(serde_json::from_str(&raw)?, base))
    }
}

/// Full path of the manifest artifact for a server output directory.
pub fn manifest_path(server_out_dir: &Path) -> PathBuf {
    server_out_dir.join(MANIFEST_FILE_NAME)
}

impl AssetManifest for BuildManifest {
    fn client_import_id(&self, key: &str) -> Result<String, AtollError> {
        let file = self
            .data
            .js_map
            .get(key)
            .ok_or_else(|| AtollError::MissingClientModule {
                path: key.to_string(),
            })?;
        Ok(format!("{}/{file}", self.base_path))
    }

    fn stylesheet_ids(&self, key: &str, _source: &str) -> Result<Vec<String>, AtollError> {
        let ids = self.data.css_map.get(key).unwrap_or(&self.data.entry_css);
        Ok(ids
            .iter()
            .map(|id| format!("{}/{id}", self.base_path))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! # Atoll
//!
//! Islands build plugin and SSR asset manifest for single-file components.
//!
//! Atoll compiles a tree of `.vue` components into two coordinated artifacts:
//! a server bundle that renders static HTML, and client bundles containing
//! only the components marked as islands with `v-client:load`. The hard parts
//! live here: island discovery, wrapper-module generation, and the manifest
//! that maps a component path to its client script chunk and stylesheets in
//! both dev (on-demand module ids) and build (content-hashed output) modes.
//!
//! The underlying bundler, the component-to-render-function compiler, file
//! discovery, and the HTTP layer are external collaborators. Atoll talks to
//! them only through the interfaces in [`plugin::hooks`] and [`sfc`].

pub mod analyze;
pub mod generate;
pub mod hydrate;
pub mod manifest;
pub mod paths;
pub mod plugin;
pub mod render;
pub mod sfc;
pub mod template;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use manifest::{
    manifest_for, AssetManifest, BuildManifest, DevManifest, ManifestData, MANIFEST_FILE_NAME,
};
pub use plugin::hooks::{BuildPhase, Bundler};
pub use plugin::orchestrate::{run_build, BuildSummary};
pub use plugin::IslandsPlugin;
pub use render::RenderContext;

// ---------------------------------------------------------------------------
// Build Mode
// ---------------------------------------------------------------------------

/// The build mode determines how the manifest resolves asset identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildMode {
    /// Development — assets resolved to unbundled, on-demand module paths.
    Dev,
    /// Production — assets resolved through the persisted build manifest.
    Prod,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// User-facing plugin configuration. All fields optional; see [`AtollConfig::resolve`].
#[derive(Debug, Clone, Default)]
pub struct AtollConfig {
    /// Project root. Component paths are keyed relative to this directory.
    pub root: Option<PathBuf>,
    /// Server-renderable component files. Discovery is the caller's job.
    pub component_paths: Vec<PathBuf>,
    /// Output directory for the client build.
    pub client_out_dir: Option<PathBuf>,
    /// Output directory for the server build (the manifest lands here).
    pub server_out_dir: Option<PathBuf>,
    /// Public base path or URL, as in the pipeline's `base` option.
    pub base: Option<String>,
    /// Dev server origin (e.g. `http://localhost:3000`), prepended to dev ids.
    pub origin: Option<String>,
    /// Build mode.
    pub mode: Option<BuildMode>,
}

/// Resolved configuration with every value filled in.
#[derive(Debug, Clone)]
pub struct ResolvedAtollConfig {
    pub root: PathBuf,
    pub component_paths: Vec<PathBuf>,
    pub client_out_dir: PathBuf,
    pub server_out_dir: PathBuf,
    pub base: String,
    pub origin: Option<String>,
    pub mode: BuildMode,
}

impl AtollConfig {
    /// Fill defaults: `dist/client` + `dist/server` under the root, base `/`.
    pub fn resolve(self) -> ResolvedAtollConfig {
        let root = self
            .root
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        ResolvedAtollConfig {
            client_out_dir: self
                .client_out_dir
                .unwrap_or_else(|| root.join("dist/client")),
            server_out_dir: self
                .server_out_dir
                .unwrap_or_else(|| root.join("dist/server")),
            base: self.base.unwrap_or_else(|| "/".to_string()),
            origin: self.origin,
            mode: self.mode.unwrap_or(BuildMode::Prod),
            component_paths: self.component_paths,
            root,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic emitted during analysis or building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, context: Option<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            context,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message: message.into(),
            context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AtollError
// ---------------------------------------------------------------------------

/// Errors that abort a build or a render.
#[derive(Debug, Error)]
pub enum AtollError {
    /// `<style src>` references an external file — unsupported by design.
    #[error("<style src> is not supported (in {path})")]
    ExternalStyleSource { path: String },

    /// A style block combines `scoped` and `module`, which cannot be
    /// expressed as a single stylesheet id.
    #[error("a <style> block cannot be both scoped and a CSS module (in {path})")]
    ScopedModuleStyle { path: String },

    /// A component is missing from the islands build data. The build that
    /// produced the manifest is inconsistent with the render input.
    #[error("{path} not found in islands build data")]
    MissingClientModule { path: String },

    #[error("build failed: {0}")]
    Build(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

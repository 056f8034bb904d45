//! The pipeline-facing interface.
//!
//! Atoll registers with an external build pipeline as a plugin. The pipeline
//! drives the hooks on [`super::IslandsPlugin`] with these argument types and
//! hands back a [`BundleOutput`] per phase. The [`Bundler`] trait is the only
//! thing a pipeline adapter must implement; nothing in this crate links a
//! concrete bundler.

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::islands::IslandsPlugin;

/// The three build phases. Style and server are independent; islands depends
/// on the island set discovered during the server phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildPhase {
    /// Client-bundles every server component to extract per-component CSS.
    Style,
    /// Client-bundles the bootstrap element plus every island component.
    Islands,
    /// Server-bundles the re-export entry; discovers islands on the way.
    Server,
}

// ---------------------------------------------------------------------------
// Hook Arguments and Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ResolveIdArgs<'a> {
    pub specifier: &'a str,
    pub importer: Option<&'a str>,
    pub phase: BuildPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub id: String,
    pub external: bool,
}

impl ResolvedId {
    pub fn internal(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadArgs<'a> {
    pub id: &'a str,
    pub phase: BuildPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutput {
    pub code: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TransformArgs<'a> {
    pub code: &'a str,
    pub id: &'a str,
    pub phase: BuildPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
}

// ---------------------------------------------------------------------------
// Bundle Output
// ---------------------------------------------------------------------------

/// One emitted chunk. `facade_module_id` is the module the chunk was entered
/// through; manifest keys derive from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub file_name: String,
    pub facade_module_id: Option<String>,
    /// Stylesheet assets this chunk imported, in emission order.
    pub imported_css: Vec<String>,
    pub is_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAsset {
    pub file_name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    Chunk(OutputChunk),
    Asset(OutputAsset),
}

/// The sealed result of one bundling phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOutput {
    pub outputs: Vec<Output>,
}

// ---------------------------------------------------------------------------
// Bundler
// ---------------------------------------------------------------------------

/// The external build pipeline. Implementations run one phase over the given
/// entry inputs, calling the plugin's resolve/load/transform hooks for every
/// module on the way, and return what they emitted.
pub trait Bundler {
    fn bundle(
        &self,
        phase: BuildPhase,
        inputs: Vec<String>,
        plugin: &IslandsPlugin,
    ) -> impl Future<Output = anyhow::Result<BundleOutput>> + Send;
}

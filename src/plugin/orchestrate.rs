//! Build orchestration.
//!
//! Three phases, one ordering rule: style and server share no mutable state
//! and run concurrently; the islands phase consumes the island set the
//! server phase discovered, so it runs strictly after. Each phase's bundle
//! output is distilled into an owned phase-data struct, the structs merge
//! into the manifest artifact, and the artifact is written exactly once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{manifest_path, ManifestData};
use crate::paths::manifest_key;
use crate::plugin::hooks::{BuildPhase, BundleOutput, Bundler, Output};
use crate::plugin::islands::IslandsPlugin;
use crate::plugin::request::{CLIENT_ENTRY_ID, CUSTOM_ELEMENT_ID, SERVER_ENTRY_ID};
use crate::{AtollError, Diagnostic, ResolvedAtollConfig};

/// What the style phase contributes to the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePhaseData {
    pub css_map: BTreeMap<String, Vec<String>>,
    pub entry_css: Vec<String>,
}

/// What the islands phase contributes to the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IslandsPhaseData {
    pub js_map: BTreeMap<String, String>,
}

/// The sealed result of a full build.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub manifest: ManifestData,
    pub manifest_path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the three bundling phases and write the manifest artifact.
pub async fn run_build<B: Bundler>(
    config: &ResolvedAtollConfig,
    bundler: &B,
) -> Result<BuildSummary, AtollError> {
    let plugin = IslandsPlugin::new(config.clone());
    let mut diagnostics = vec![Diagnostic::info(format!(
        "build started: {} server components",
        config.component_paths.len()
    ))];

    // Style and server are independent. Server-phase transforms populate the
    // island set as a side effect of bundling the server entry.
    let (style_result, server_result) = tokio::join!(
        bundler.bundle(
            BuildPhase::Style,
            vec![CLIENT_ENTRY_ID.to_string()],
            &plugin
        ),
        bundler.bundle(
            BuildPhase::Server,
            vec![SERVER_ENTRY_ID.to_string()],
            &plugin
        ),
    );
    let mut style_output =
        style_result.map_err(|e| AtollError::Build(format!("style phase failed: {e}")))?;
    server_result.map_err(|e| AtollError::Build(format!("server phase failed: {e}")))?;

    let style_data = collect_style_data(&config.root, &mut style_output);

    // Island discovery is complete; only now is the islands input list final.
    let mut islands_inputs = vec![CUSTOM_ELEMENT_ID.to_string()];
    islands_inputs.extend(plugin.island_inputs());

    let mut islands_output = bundler
        .bundle(BuildPhase::Islands, islands_inputs, &plugin)
        .await
        .map_err(|e| AtollError::Build(format!("islands phase failed: {e}")))?;
    let islands_data = collect_islands_data(&config.root, &mut islands_output);

    let manifest = ManifestData {
        css_map: style_data.css_map,
        entry_css: style_data.entry_css,
        js_map: islands_data.js_map,
    };

    tokio::fs::create_dir_all(&config.server_out_dir).await?;
    let manifest_path = manifest_path(&config.server_out_dir);
    tokio::fs::write(&manifest_path, serde_json::to_string(&manifest)?).await?;

    diagnostics.extend(plugin.take_diagnostics());
    diagnostics.push(Diagnostic::info(format!(
        "manifest written: {} js entries, {} css entries",
        manifest.js_map.len(),
        manifest.css_map.len(),
    )));

    Ok(BuildSummary {
        manifest,
        manifest_path,
        diagnostics,
    })
}

// ---------------------------------------------------------------------------
// Phase Data Collection
// ---------------------------------------------------------------------------

/// Distill the style-phase bundle: per-component stylesheet lists keyed by
/// root-relative path, the aggregate entry list, and the synthetic entry's
/// own script chunk dropped from the output.
pub fn collect_style_data(root: &Path, bundle: &mut BundleOutput) -> StylePhaseData {
    let mut data = StylePhaseData::default();

    bundle.outputs.retain(|output| {
        let Output::Chunk(chunk) = output else {
            return true;
        };
        let Some(facade) = &chunk.facade_module_id else {
            return true;
        };

        if facade == CLIENT_ENTRY_ID {
            data.entry_css = chunk.imported_css.clone();
            return false;
        }

        data.css_map
            .insert(manifest_key(root, facade), chunk.imported_css.clone());
        true
    });

    data
}

/// Distill the islands-phase bundle: chunk file names keyed by root-relative
/// path. Stylesheets were already emitted by the style phase, so duplicate
/// CSS assets are dropped here.
pub fn collect_islands_data(root: &Path, bundle: &mut BundleOutput) -> IslandsPhaseData {
    let mut data = IslandsPhaseData::default();

    bundle.outputs.retain(|output| match output {
        Output::Asset(asset) => !asset.file_name.ends_with(".css"),
        Output::Chunk(chunk) => {
            if let Some(facade) = &chunk.facade_module_id {
                data.js_map
                    .insert(manifest_key(root, facade), chunk.file_name.clone());
            }
            true
        }
    });

    data
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

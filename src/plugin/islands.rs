//! The islands plugin.
//!
//! Registered with the external pipeline and driven through three hook
//! points, phase by phase:
//!
//! - `resolve_id` — answers for atoll's own module ids, and on the server
//!   phase redirects every component import to its wrapper form: island
//!   wrapper when the importing template marked that component, server
//!   wrapper otherwise.
//! - `load` — produces generated module text per [`ModuleRequest`] variant;
//!   raw-source requests read the component file.
//! - `transform` — server phase, raw component sources only: rewrites
//!   island-marked template elements to wrapper component references,
//!   injects the wrapper imports, and records each island's component path
//!   for the islands phase.
//!
//! Island discovery state is shared across hooks through concurrent sets;
//! each key is written once, so phases never race on a value.

use std::sync::Mutex;

use dashmap::{DashMap, DashSet};

use crate::analyze::{self, ISLAND_DIRECTIVE};
use crate::generate::{self, escape_js_single_quoted};
use crate::paths::{normalize, parse_id, resolve_import, COMPONENT_EXT};
use crate::plugin::hooks::{
    BuildPhase, LoadArgs, LoadOutput, ResolveIdArgs, ResolvedId, TransformArgs, TransformOutput,
};
use crate::plugin::request::{ModuleRequest, CUSTOM_ELEMENT_ID};
use crate::sfc;
use crate::template::ElementNode;
use crate::{hydrate, AtollError, Diagnostic, ResolvedAtollConfig};

pub struct IslandsPlugin {
    config: ResolvedAtollConfig,
    /// Component paths some template marked as islands. Feeds both server
    /// resolve dispatch and the islands-phase input list.
    island_imports: DashSet<String>,
    /// Importing file → islands its template marked, for introspection.
    islands_by_importer: DashMap<String, Vec<String>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl IslandsPlugin {
    pub fn new(config: ResolvedAtollConfig) -> Self {
        Self {
            config,
            island_imports: DashSet::new(),
            islands_by_importer: DashMap::new(),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        "atoll:islands"
    }

    /// Every island component discovered so far, sorted for determinism.
    /// Complete only once the server phase has finished.
    pub fn island_inputs(&self) -> Vec<String> {
        let mut inputs: Vec<String> = self
            .island_imports
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        inputs.sort();
        inputs
    }

    /// Islands marked by one importing file, if any.
    pub fn islands_of(&self, importer: &str) -> Option<Vec<String>> {
        self.islands_by_importer
            .get(&normalize(parse_id(importer).file_name))
            .map(|entry| entry.value().clone())
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock().expect("diagnostics poisoned"))
    }

    fn warn(&self, message: String, context: Option<String>) {
        self.diagnostics
            .lock()
            .expect("diagnostics poisoned")
            .push(Diagnostic::warning(message, context));
    }

    fn component_path_strings(&self) -> Vec<String> {
        self.config
            .component_paths
            .iter()
            .map(|p| normalize(&p.to_string_lossy()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Resolve atoll module ids; on the server phase, intercept component
    /// imports and redirect them to wrapper requests.
    pub fn resolve_id(&self, args: &ResolveIdArgs<'_>) -> Option<ResolvedId> {
        let request = ModuleRequest::parse(args.specifier);

        match args.phase {
            BuildPhase::Style => match request {
                Some(ModuleRequest::ClientEntry) => Some(ResolvedId::internal(args.specifier)),
                _ => None,
            },
            BuildPhase::Islands => match request {
                Some(ModuleRequest::CustomElement) => {
                    Some(ResolvedId::internal(CUSTOM_ELEMENT_ID))
                }
                _ => None,
            },
            BuildPhase::Server => {
                if let Some(request) = request {
                    return match request {
                        ModuleRequest::ServerEntry
                        | ModuleRequest::IslandFlag
                        | ModuleRequest::ServerWrapper(_)
                        | ModuleRequest::IslandWrapper(_)
                        | ModuleRequest::RawSource(_) => Some(ResolvedId::internal(request.id())),
                        _ => None,
                    };
                }

                let parsed = parse_id(args.specifier);
                if !parsed.file_name.ends_with(COMPONENT_EXT) || parsed.query.vue {
                    return None;
                }
                // Wrapper modules import only `?original`, handled above; a
                // plain component import from a wrapper would recurse.
                if args.importer.is_some_and(ModuleRequest::is_wrapper_id) {
                    return None;
                }

                let absolute = if args.specifier.starts_with('/') {
                    normalize(args.specifier)
                } else {
                    resolve_import(args.importer?, args.specifier)?
                };

                let request = if self.island_imports.contains(&absolute) {
                    ModuleRequest::IslandWrapper(absolute)
                } else {
                    ModuleRequest::ServerWrapper(absolute)
                };
                Some(ResolvedId::internal(request.id()))
            }
        }
    }

    /// Serve generated module text; raw-source requests read the file.
    pub fn load(&self, args: &LoadArgs<'_>) -> anyhow::Result<Option<LoadOutput>> {
        let Some(request) = ModuleRequest::parse(args.id) else {
            return Ok(None);
        };

        let code = match (args.phase, request) {
            (BuildPhase::Style, ModuleRequest::ClientEntry) => {
                generate::client_entry(&self.component_path_strings())
            }
            (BuildPhase::Islands, ModuleRequest::CustomElement) => {
                hydrate::CUSTOM_ELEMENT_SOURCE.to_string()
            }
            (BuildPhase::Server, ModuleRequest::ServerEntry) => {
                generate::server_entry(&self.component_path_strings(), &self.config.root)
            }
            (BuildPhase::Server, ModuleRequest::IslandFlag) => {
                generate::ISLAND_FLAG_SOURCE.to_string()
            }
            (BuildPhase::Server, ModuleRequest::ServerWrapper(path)) => {
                generate::server_wrapper(&path, &self.config.root)
            }
            (BuildPhase::Server, ModuleRequest::IslandWrapper(path)) => {
                generate::island_wrapper(&path, &self.config.root)
            }
            (BuildPhase::Server, ModuleRequest::RawSource(path)) => {
                std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("failed to read component '{path}': {e}"))?
            }
            _ => return Ok(None),
        };

        Ok(Some(LoadOutput { code }))
    }

    /// Rewrite island directives in a raw component source and record the
    /// discovered island components.
    pub fn transform(&self, args: &TransformArgs<'_>) -> anyhow::Result<Option<TransformOutput>> {
        if args.phase != BuildPhase::Server {
            return Ok(None);
        }

        let parsed = parse_id(args.id);
        if !parsed.file_name.ends_with(COMPONENT_EXT) || parsed.query.vue || !parsed.query.original
        {
            return Ok(None);
        }

        let descriptor = sfc::parse(args.code);

        for style in &descriptor.styles {
            if style.src.is_some() {
                return Err(AtollError::ExternalStyleSource {
                    path: parsed.file_name.to_string(),
                }
                .into());
            }
        }

        let Some(template) = &descriptor.template else {
            return Ok(None);
        };

        let import_map = analyze::build_import_map(&descriptor);
        let islands = analyze::find_island_elements(&template.roots);
        if islands.is_empty() {
            return Ok(None);
        }

        let mut edits: Vec<(usize, usize, String)> = Vec::new();
        let mut imports: Vec<String> = Vec::new();
        let mut discovered: Vec<String> = Vec::new();
        let mut rewritten_spans: Vec<(usize, usize)> = Vec::new();

        for element in &islands {
            // A mark nested inside an already-rewritten island hydrates with
            // its ancestor; the rewrite below strips its directive.
            if rewritten_spans
                .iter()
                .any(|&(start, end)| start < element.start && element.end <= end)
            {
                self.warn(
                    format!(
                        "nested {ISLAND_DIRECTIVE} on \"{}\" hydrates with its enclosing island",
                        element.tag
                    ),
                    Some(parsed.file_name.to_string()),
                );
                continue;
            }

            let Some(source) = import_map.get(&element.tag) else {
                self.warn(
                    format!(
                        "{ISLAND_DIRECTIVE} on \"{}\" is not supported. \
                         Only statically imported components can become islands.",
                        element.tag
                    ),
                    Some(parsed.file_name.to_string()),
                );
                continue;
            };
            let Some(absolute) = resolve_import(args.id, source) else {
                self.warn(
                    format!(
                        "{ISLAND_DIRECTIVE} on \"{}\" resolves to a bare specifier \
                         ('{source}') and cannot become an island",
                        element.tag
                    ),
                    Some(parsed.file_name.to_string()),
                );
                continue;
            };

            let wrapper_name = format!("AtollIsland{}", discovered.len());
            imports.push(format!(
                "import {wrapper_name} from '{}'",
                escape_js_single_quoted(&ModuleRequest::IslandWrapper(absolute.clone()).id())
            ));
            edits.push(rewrite_island_element(args.code, element, &wrapper_name));
            rewritten_spans.push((element.start, element.end));

            self.island_imports.insert(absolute.clone());
            discovered.push(absolute);
        }

        if edits.is_empty() {
            return Ok(None);
        }

        self.islands_by_importer
            .insert(normalize(parsed.file_name), discovered);

        let import_block = imports.join("\n");
        match descriptor
            .script_setup
            .as_ref()
            .or(descriptor.script.as_ref())
        {
            Some(script) => edits.push((
                script.content_start,
                script.content_start,
                format!("\n{import_block}"),
            )),
            // Markup-only component with resolvable islands cannot occur
            // (resolution needs an import), but stay total.
            None => edits.push((0, 0, format!("<script setup>\n{import_block}\n</script>\n"))),
        }

        Ok(Some(TransformOutput {
            code: apply_edits(args.code, edits),
        }))
    }
}

// ---------------------------------------------------------------------------
// Rewriting
// ---------------------------------------------------------------------------

/// Replace an island-marked element with a wrapper component reference,
/// forwarding every attribute except the directive and preserving children
/// as slot content. Nested directive marks inside the children are stripped.
fn rewrite_island_element(
    source: &str,
    element: &ElementNode,
    wrapper_name: &str,
) -> (usize, usize, String) {
    let props: Vec<&str> = element
        .attrs
        .iter()
        .filter(|attr| attr.name != ISLAND_DIRECTIVE)
        .map(|attr| &source[attr.start..attr.end])
        .collect();
    let props = if props.is_empty() {
        String::new()
    } else {
        format!(" {}", props.join(" "))
    };

    if element.self_closing {
        return (
            element.start,
            element.end,
            format!("<{wrapper_name}{props} />"),
        );
    }

    let close_needle = format!("</{}", element.tag);
    let close_start = source[element.start..element.end]
        .rfind(&close_needle)
        .map_or(element.end, |idx| element.start + idx);
    let children =
        source[element.open_tag_end..close_start].replace(&format!(" {ISLAND_DIRECTIVE}"), "");

    (
        element.start,
        element.end,
        format!("<{wrapper_name}{props}>{children}</{wrapper_name}>"),
    )
}

/// Apply disjoint `(start, end, replacement)` edits, highest offset first so
/// earlier spans stay valid.
fn apply_edits(code: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = code.to_string();
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AtollConfig, BuildMode};
    use std::path::PathBuf;

    fn plugin() -> IslandsPlugin {
        IslandsPlugin::new(
            AtollConfig {
                root: Some(PathBuf::from("/project")),
                component_paths: vec![
                    PathBuf::from("/project/src/Main.vue"),
                    PathBuf::from("/project/src/Counter.vue"),
                ],
                mode: Some(BuildMode::Prod),
                ..Default::default()
            }
            .resolve(),
        )
    }

    const MAIN: &str = r#"<script setup>
import Counter from './Counter.vue'
import Plain from './Plain.vue'
</script>

<template>
  <main>
    <Plain />
    <Counter v-client:load :start="3" />
  </main>
</template>
"#;

    fn transform_main(plugin: &IslandsPlugin) -> TransformOutput {
        plugin
            .transform(&TransformArgs {
                code: MAIN,
                id: "/project/src/Main.vue?original",
                phase: BuildPhase::Server,
            })
            .unwrap()
            .expect("island transform applies")
    }

    #[test]
    fn transform_rewrites_marked_element_and_injects_import() {
        let plugin = plugin();
        let output = transform_main(&plugin);

        assert!(output
            .code
            .contains("import AtollIsland0 from '@atoll/island-wrapper:/project/src/Counter.vue'"));
        assert!(output.code.contains(r#"<AtollIsland0 :start="3" />"#));
        assert!(!output.code.contains("v-client:load"));
        // Unmarked usage is untouched.
        assert!(output.code.contains("<Plain />"));
    }

    #[test]
    fn transform_records_discovery() {
        let plugin = plugin();
        transform_main(&plugin);

        assert_eq!(
            plugin.island_inputs(),
            vec!["/project/src/Counter.vue".to_string()]
        );
        assert_eq!(
            plugin.islands_of("/project/src/Main.vue?original"),
            Some(vec!["/project/src/Counter.vue".to_string()])
        );
    }

    #[test]
    fn transform_skips_plain_and_sub_requests() {
        let plugin = plugin();
        for id in [
            "/project/src/Main.vue",
            "/project/src/Main.vue?vue&type=style&index=0&lang.css",
            "/project/src/util.ts?original",
        ] {
            let output = plugin
                .transform(&TransformArgs {
                    code: MAIN,
                    id,
                    phase: BuildPhase::Server,
                })
                .unwrap();
            assert!(output.is_none(), "{id} must pass through");
        }
    }

    #[test]
    fn transform_without_marks_is_untouched() {
        let plugin = plugin();
        let output = plugin
            .transform(&TransformArgs {
                code: "<template><div><Counter /></div></template>",
                id: "/project/src/Main.vue?original",
                phase: BuildPhase::Server,
            })
            .unwrap();
        assert!(output.is_none());
    }

    #[test]
    fn unresolved_mark_warns_and_leaves_element() {
        let plugin = plugin();
        let code = r#"<script setup>
import Counter from './Counter.vue'
</script>
<template>
  <component :is="dynamic" v-client:load />
</template>
"#;
        let output = plugin
            .transform(&TransformArgs {
                code,
                id: "/project/src/Main.vue?original",
                phase: BuildPhase::Server,
            })
            .unwrap();
        assert!(output.is_none());

        let diagnostics = plugin.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("\"component\""));
        assert!(plugin.island_inputs().is_empty());
    }

    #[test]
    fn style_src_aborts_the_transform() {
        let plugin = plugin();
        let code = r#"<template><div/></template><style src="./x.css"></style>"#;
        let err = plugin
            .transform(&TransformArgs {
                code,
                id: "/project/src/Main.vue?original",
                phase: BuildPhase::Server,
            })
            .unwrap_err();
        assert!(err.to_string().contains("<style src>"));
    }

    #[test]
    fn resolve_redirects_component_imports_per_island_set() {
        let plugin = plugin();
        transform_main(&plugin);

        let marked = plugin
            .resolve_id(&ResolveIdArgs {
                specifier: "./Counter.vue",
                importer: Some("/project/src/Main.vue?original"),
                phase: BuildPhase::Server,
            })
            .unwrap();
        assert_eq!(marked.id, "@atoll/island-wrapper:/project/src/Counter.vue");

        let unmarked = plugin
            .resolve_id(&ResolveIdArgs {
                specifier: "./Plain.vue",
                importer: Some("/project/src/Main.vue?original"),
                phase: BuildPhase::Server,
            })
            .unwrap();
        assert_eq!(unmarked.id, "@atoll/server-wrapper:/project/src/Plain.vue");
    }

    #[test]
    fn resolve_is_phase_scoped() {
        let plugin = plugin();

        assert!(plugin
            .resolve_id(&ResolveIdArgs {
                specifier: "@atoll/client-entry",
                importer: None,
                phase: BuildPhase::Style,
            })
            .is_some());
        assert!(plugin
            .resolve_id(&ResolveIdArgs {
                specifier: "@atoll/client-entry",
                importer: None,
                phase: BuildPhase::Islands,
            })
            .is_none());
        assert!(plugin
            .resolve_id(&ResolveIdArgs {
                specifier: "./Counter.vue",
                importer: Some("/project/src/Main.vue"),
                phase: BuildPhase::Style,
            })
            .is_none());
    }

    #[test]
    fn load_serves_generated_modules() {
        let plugin = plugin();

        let entry = plugin
            .load(&LoadArgs {
                id: "@atoll/client-entry",
                phase: BuildPhase::Style,
            })
            .unwrap()
            .unwrap();
        assert!(entry.code.contains("import component0 from '/project/src/Main.vue'"));

        let element = plugin
            .load(&LoadArgs {
                id: "@atoll/element",
                phase: BuildPhase::Islands,
            })
            .unwrap()
            .unwrap();
        assert!(element.code.contains("customElements.define"));

        let wrapper = plugin
            .load(&LoadArgs {
                id: "@atoll/island-wrapper:/project/src/Counter.vue",
                phase: BuildPhase::Server,
            })
            .unwrap()
            .unwrap();
        assert!(wrapper.code.contains("getClientImportId('src/Counter.vue')"));

        let server_entry = plugin
            .load(&LoadArgs {
                id: "@atoll/server-entry",
                phase: BuildPhase::Server,
            })
            .unwrap()
            .unwrap();
        assert!(server_entry.code.contains("_src_Main"));
        assert!(server_entry.code.contains("_src_Counter"));
    }

    #[test]
    fn nested_mark_in_same_template_joins_ancestor() {
        let plugin = plugin();
        let code = r#"<script setup>
import Counter from './Counter.vue'
import Widget from './Widget.vue'
</script>
<template>
  <Counter v-client:load>
    <Widget v-client:load />
  </Counter>
</template>
"#;
        let output = plugin
            .transform(&TransformArgs {
                code,
                id: "/project/src/Main.vue?original",
                phase: BuildPhase::Server,
            })
            .unwrap()
            .unwrap();

        assert!(output.code.contains("<AtollIsland0>"));
        assert!(output.code.contains("<Widget />"));
        assert!(!output.code.contains("v-client:load"));
        assert_eq!(plugin.island_inputs().len(), 1);

        let diagnostics = plugin.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("enclosing island"));
    }
}

//! Generated module text.
//!
//! Four pure generators, string in → string out, no I/O:
//! - the client entry aggregating every server component (style extraction)
//! - the server entry re-exporting every component under a stable name
//! - the server wrapper, adding stylesheet bookkeeping around a component
//! - the island wrapper, bridging server output to client hydration
//!
//! Asset lookups in generated code go through `context.manifest` at render
//! time, so the same wrapper text is valid before the islands build has run.

use std::path::Path;

use crate::hydrate::CUSTOM_ELEMENT_TAG;
use crate::paths::{export_name, manifest_key};
use crate::plugin::request::{ModuleRequest, CUSTOM_ELEMENT_ID, ISLAND_FLAG_ID};

/// Module body for the island nesting flag. An injection key, evaluated once
/// per server process.
pub const ISLAND_FLAG_SOURCE: &str = "export default Symbol('atoll:island')\n";

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// The synthetic client entry: imports every server component so the style
/// phase sees each of them as a chunk, then re-exports the bindings so none
/// of the side-effect-only modules can be eliminated as dead code.
pub fn client_entry(component_paths: &[String]) -> String {
    let mut code = String::new();
    let mut names = Vec::with_capacity(component_paths.len());

    for (index, path) in component_paths.iter().enumerate() {
        let name = format!("component{index}");
        code.push_str(&format!(
            "import {name} from '{}'\n",
            escape_js_single_quoted(path)
        ));
        names.push(name);
    }

    code.push_str(&format!("\nexport {{ {} }}\n", names.join(", ")));
    code
}

/// The server entry: one re-export per component, named after its path
/// relative to `base_dir` (see [`export_name`] for the collision-free
/// escaping).
pub fn server_entry(component_paths: &[String], base_dir: &Path) -> String {
    let mut code = String::new();
    for path in component_paths {
        let name = export_name(&manifest_key(base_dir, path));
        code.push_str(&format!(
            "export {{ default as {name} }} from '{}'\n",
            escape_js_single_quoted(path)
        ));
    }
    code
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

/// The server wrapper: renders the original component unchanged and records
/// its stylesheet ids into the active render context.
pub fn server_wrapper(component_path: &str, root: &Path) -> String {
    let original = ModuleRequest::RawSource(component_path.to_string()).id();
    let key = manifest_key(root, component_path);

    format!(
        r#"<script setup>
import {{ useSSRContext }} from 'vue'
import OriginalComponent from '{original}'

const context = useSSRContext()

context.loadCss ??= new Set()
for (const id of context.manifest.getDependingStylesheetIds('{key}')) {{
  context.loadCss.add(id)
}}
</script>

<template>
  <OriginalComponent />
</template>
"#,
        original = escape_js_single_quoted(&original),
        key = escape_js_single_quoted(&key),
    )
}

/// The island wrapper. A root island records the hydration bootstrap module
/// and its stylesheets, then renders the host element with the resolved
/// client module reference and JSON props (omitted entirely when empty). An
/// island nested inside another island renders the original component
/// directly — it hydrates as part of its ancestor.
pub fn island_wrapper(component_path: &str, root: &Path) -> String {
    let original = ModuleRequest::RawSource(component_path.to_string()).id();
    let key = manifest_key(root, component_path);

    format!(
        r#"<script setup>
import {{ useSSRContext, useAttrs, provide, inject }} from 'vue'
import islandFlag from '{flag}'
import OriginalComponent from '{original}'

defineOptions({{
  inheritAttrs: false,
}})

const inIsland = inject(islandFlag, false)
provide(islandFlag, true)

const context = useSSRContext()
const attrs = useAttrs()

const entry = context.manifest.getClientImportId('{key}')

context.loadJs ??= new Set()
context.loadJs.add(context.manifest.getClientImportId('{element}'))

context.loadCss ??= new Set()
for (const id of context.manifest.getDependingStylesheetIds('{key}')) {{
  context.loadCss.add(id)
}}

const isEmptyProps = Object.keys(attrs).length === 0
</script>

<template>
  <OriginalComponent v-if="inIsland" v-bind="$attrs" />
  <{tag} v-else :entry="entry" :serialized-props="isEmptyProps ? undefined : JSON.stringify(attrs)">
    <OriginalComponent v-bind="$attrs" />
  </{tag}>
</template>
"#,
        flag = ISLAND_FLAG_ID,
        original = escape_js_single_quoted(&original),
        key = escape_js_single_quoted(&key),
        element = CUSTOM_ELEMENT_ID,
        tag = CUSTOM_ELEMENT_TAG,
    )
}

// ---------------------------------------------------------------------------
// JS String Escaping
// ---------------------------------------------------------------------------

/// Escape a string for embedding inside a single-quoted JS literal.
pub fn escape_js_single_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    #[test]
    fn client_entry_numbers_every_import() {
        let code = client_entry(&[
            "/project/src/A.vue".to_string(),
            "/project/src/B.vue".to_string(),
        ]);
        assert!(code.contains("import component0 from '/project/src/A.vue'"));
        assert!(code.contains("import component1 from '/project/src/B.vue'"));
        assert!(code.contains("export { component0, component1 }"));
    }

    #[test]
    fn server_entry_uses_escaped_names() {
        let code = server_entry(
            &["/project/user/profile.vue".to_string()],
            &root(),
        );
        assert!(code.contains(
            "export { default as _user_profile } from '/project/user/profile.vue'"
        ));
    }

    #[test]
    fn server_wrapper_reads_manifest_at_render_time() {
        let code = server_wrapper("/project/src/Card.vue", &root());
        assert!(code.contains("from '/project/src/Card.vue?original'"));
        assert!(code.contains("getDependingStylesheetIds('src/Card.vue')"));
        assert!(code.contains("context.loadCss"));
        assert!(!code.contains("loadJs"));
    }

    #[test]
    fn island_wrapper_declares_nesting_flag_and_host() {
        let code = island_wrapper("/project/src/Counter.vue", &root());
        assert!(code.contains("import islandFlag from '@atoll/island-flag'"));
        assert!(code.contains("inject(islandFlag, false)"));
        assert!(code.contains("provide(islandFlag, true)"));
        assert!(code.contains("getClientImportId('src/Counter.vue')"));
        assert!(code.contains("getClientImportId('@atoll/element')"));
        assert!(code.contains("<atoll-island v-else"));
        assert!(code.contains("isEmptyProps ? undefined : JSON.stringify(attrs)"));
        assert!(code.contains(r#"<OriginalComponent v-if="inIsland" v-bind="$attrs" />"#));
    }

    #[test]
    fn paths_with_quotes_are_escaped() {
        let code = server_wrapper("/project/src/o'brien.vue", &root());
        assert!(code.contains(r"o\'brien.vue?original"));
    }
}

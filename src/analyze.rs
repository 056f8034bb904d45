//! Source Analyzer.
//!
//! Two independent answers about one component source:
//! - which template tag names are bound to which imported component files
//! - which template elements carry the island directive
//!
//! Binding extraction prefers the `<script setup>` form when present. The
//! options form consults an explicit `components: { … }` registration table
//! before falling back to raw import names. Only component-file imports are
//! retained either way.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::paths::is_component_file;
use crate::sfc::SfcDescriptor;
use crate::template::{ElementNode, TemplateNode};

/// The directive that marks a template element as an island.
pub const ISLAND_DIRECTIVE: &str = "v-client:load";

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+(\w+)\s+from\s+['"]([^'"]+)['"]"#).expect("import regex")
});

static COMPONENTS_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|[,{\s])(?:components|'components'|"components")\s*:\s*\{"#).expect("components regex"));

static TABLE_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:'([^']+)'|"([^"]+)"|([A-Za-z_$][\w$]*))\s*(?::\s*([A-Za-z_$][\w$]*))?$"#)
        .expect("table entry regex")
});

// ---------------------------------------------------------------------------
// Import Bindings
// ---------------------------------------------------------------------------

/// Build the tag-name → import-source map for a component.
///
/// Sources are returned as written in the import statement; resolving them
/// against the importing file is the caller's concern.
pub fn build_import_map(descriptor: &SfcDescriptor) -> BTreeMap<String, String> {
    if let Some(script) = &descriptor.script_setup {
        return component_imports(&script.content);
    }

    let Some(script) = &descriptor.script else {
        return BTreeMap::new();
    };

    let imports = component_imports(&script.content);
    let table = registration_table(&script.content);

    if table.is_empty() {
        return imports;
    }

    // The registration table decides the tag names; imports supply sources.
    let mut map = BTreeMap::new();
    for (tag, import_name) in table {
        if let Some(source) = imports.get(&import_name) {
            map.insert(tag, source.clone());
        }
    }
    map
}

/// Default imports of component files, keyed by the imported identifier.
fn component_imports(script: &str) -> BTreeMap<String, String> {
    IMPORT_RE
        .captures_iter(script)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let source = caps.get(2)?.as_str();
            is_component_file(source).then(|| (name.to_string(), source.to_string()))
        })
        .collect()
}

/// Extract the `components: { … }` table: tag name → bound identifier.
/// Shorthand entries (`{ Counter }`) bind the identifier to itself.
fn registration_table(script: &str) -> BTreeMap<String, String> {
    let Some(m) = COMPONENTS_KEY_RE.find(script) else {
        return BTreeMap::new();
    };
    let body_start = m.end();
    let Some(body) = balanced_braces(&script[body_start..]) else {
        return BTreeMap::new();
    };

    let mut table = BTreeMap::new();
    for entry in body.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some(caps) = TABLE_ENTRY_RE.captures(entry) {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|k| k.as_str().to_string());
            if let Some(key) = key {
                let value = caps.get(4).map_or_else(|| key.clone(), |v| v.as_str().to_string());
                table.insert(key, value);
            }
        }
    }
    table
}

/// Content of a `{ … }` body whose opening brace was just consumed.
fn balanced_braces(rest: &str) -> Option<&str> {
    let mut depth = 1usize;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Island Discovery
// ---------------------------------------------------------------------------

/// Depth-first search for elements carrying the island directive, including
/// nested elements and slot default content. A marked element's own subtree
/// is still searched: nesting resolution happens later, at render time.
pub fn find_island_elements(nodes: &[TemplateNode]) -> Vec<&ElementNode> {
    let mut results = Vec::new();
    collect_islands(nodes, &mut results);
    results
}

fn collect_islands<'a>(nodes: &'a [TemplateNode], results: &mut Vec<&'a ElementNode>) {
    for node in nodes {
        let TemplateNode::Element(element) = node else {
            continue;
        };
        if element.has_attr(ISLAND_DIRECTIVE) {
            results.push(element);
        }
        collect_islands(&element.children, results);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfc;

    #[test]
    fn literal_script_imports() {
        let source = r#"<script setup>
import Counter from './Counter.vue'
import Button from '../ui/Button.vue'
import { ref } from 'vue'
import utils from './utils.js'
</script>
<template><div/></template>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map.len(), 2);
        assert_eq!(map["Counter"], "./Counter.vue");
        assert_eq!(map["Button"], "../ui/Button.vue");
    }

    #[test]
    fn options_script_uses_registration_table() {
        let source = r#"<script>
import CounterImpl from './Counter.vue'
export default {
  components: { 'my-counter': CounterImpl },
}
</script>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map.len(), 1);
        assert_eq!(map["my-counter"], "./Counter.vue");
    }

    #[test]
    fn options_script_shorthand_table() {
        let source = r#"<script>
import Counter from './Counter.vue'
export default { components: { Counter } }
</script>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map["Counter"], "./Counter.vue");
    }

    #[test]
    fn options_script_without_table_falls_back_to_import_names() {
        let source = r#"<script>
import Counter from './Counter.vue'
export default {}
</script>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map["Counter"], "./Counter.vue");
    }

    #[test]
    fn table_entries_without_matching_import_are_dropped() {
        let source = r#"<script>
import Counter from './Counter.vue'
export default { components: { Widget: SomethingElse, Counter } }
</script>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Counter"));
    }

    #[test]
    fn literal_form_wins_when_both_present() {
        let source = r#"<script>
import Legacy from './Legacy.vue'
export default { components: { Legacy } }
</script>
<script setup>
import Counter from './Counter.vue'
</script>"#;
        let map = build_import_map(&sfc::parse(source));
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Counter"));
    }

    #[test]
    fn finds_islands_at_any_depth() {
        let source = r#"<template>
  <div>
    <Counter v-client:load />
    <section>
      <slot><Widget v-client:load /></slot>
    </section>
    <Plain />
  </div>
</template>"#;
        let descriptor = sfc::parse(source);
        let template = descriptor.template.unwrap();
        let islands = find_island_elements(&template.roots);
        let tags: Vec<&str> = islands.iter().map(|el| el.tag.as_str()).collect();
        assert_eq!(tags, vec!["Counter", "Widget"]);
    }

    #[test]
    fn no_marks_no_islands() {
        let source = "<template><div><Counter /></div></template>";
        let descriptor = sfc::parse(source);
        let template = descriptor.template.unwrap();
        let islands = find_island_elements(&template.roots);
        assert!(islands.is_empty());
    }
}

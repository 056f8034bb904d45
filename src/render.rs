//! Server-render support.
//!
//! One [`RenderContext`] exists per render call. Wrapper modules record the
//! assets their components need while the tree renders; once rendering is
//! done, [`RenderContext::inject_assets`] flushes the collected ids into the
//! HTML as `<link>` and `<script>` tags.
//!
//! Island nesting is threaded as an explicit flag saved and restored around
//! the inner render closure — a nested island renders as plain markup and
//! hydrates with its ancestor.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::hydrate::CUSTOM_ELEMENT_TAG;
use crate::manifest::AssetManifest;
use crate::plugin::request::CUSTOM_ELEMENT_ID;
use crate::AtollError;

static INJECTION_POINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head>|<body[\s>]").expect("injection regex"));

/// Per-render accumulator of client asset ids.
pub struct RenderContext<'m> {
    manifest: &'m dyn AssetManifest,
    pub load_js: BTreeSet<String>,
    pub load_css: BTreeSet<String>,
    inside_island: bool,
}

impl<'m> RenderContext<'m> {
    pub fn new(manifest: &'m dyn AssetManifest) -> Self {
        Self {
            manifest,
            load_js: BTreeSet::new(),
            load_css: BTreeSet::new(),
            inside_island: false,
        }
    }

    /// Whether the current render position is inside an island subtree.
    pub fn inside_island(&self) -> bool {
        self.inside_island
    }

    /// Record a server-rendered component's stylesheets. The counterpart of
    /// the generated server wrapper.
    pub fn record_component(&mut self, key: &str, source: &str) -> Result<(), AtollError> {
        for id in self.manifest.stylesheet_ids(key, source)? {
            self.load_css.insert(id);
        }
        Ok(())
    }

    /// Render an island component. The counterpart of the generated island
    /// wrapper: a root island records its assets and wraps `render_inner`'s
    /// output in the hydration host element; a nested island defers entirely
    /// to its ancestor and renders the inner markup unchanged.
    pub fn render_island<F>(
        &mut self,
        key: &str,
        source: &str,
        props: &Map<String, Value>,
        render_inner: F,
    ) -> Result<String, AtollError>
    where
        F: FnOnce(&mut Self) -> Result<String, AtollError>,
    {
        if self.inside_island {
            return render_inner(self);
        }

        self.inside_island = true;
        let inner = render_inner(self);
        self.inside_island = false;
        let inner = inner?;

        let entry = self.manifest.client_import_id(key)?;
        self.load_js
            .insert(self.manifest.client_import_id(CUSTOM_ELEMENT_ID)?);
        self.record_component(key, source)?;

        let mut host = format!(
            "<{CUSTOM_ELEMENT_TAG} entry=\"{}\"",
            escape_attribute(&entry)
        );
        if !props.is_empty() {
            let serialized = serde_json::to_string(&Value::Object(props.clone()))?;
            host.push_str(&format!(
                " serialized-props=\"{}\"",
                escape_attribute(&serialized)
            ));
        }
        host.push('>');
        host.push_str(&inner);
        host.push_str(&format!("</{CUSTOM_ELEMENT_TAG}>"));
        Ok(host)
    }

    /// Flush collected asset ids into the HTML, before `</head>` or the
    /// opening `<body>` — or at the very start when neither exists.
    pub fn inject_assets(&self, html: &str) -> String {
        let mut injecting = String::new();
        for href in &self.load_css {
            injecting.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\">",
                escape_attribute(href)
            ));
        }
        for src in &self.load_js {
            injecting.push_str(&format!(
                "<script type=\"module\" src=\"{}\" async></script>",
                escape_attribute(src)
            ));
        }

        let point = INJECTION_POINT_RE.find(html).map_or(0, |m| m.start());
        format!("{}{injecting}{}", &html[..point], &html[point..])
    }
}

/// Escape a string for a double-quoted HTML attribute value.
pub fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

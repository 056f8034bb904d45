//! Single-file-component descriptor types and the block-level scanner.
//!
//! This is the consumed interface of the external component compiler: a
//! component source splits into at most one `<template>` block, `<script>` /
//! `<script setup>` blocks, and any number of `<style>` blocks. Atoll never
//! compiles templates to render functions — it only needs the block
//! boundaries, the block attributes, and the template element tree.

use std::sync::LazyLock;

use regex::Regex;

use crate::template::{self, TemplateNode};

// ---------------------------------------------------------------------------
// Descriptor Types
// ---------------------------------------------------------------------------

/// A parsed component source.
#[derive(Debug, Clone, Default)]
pub struct SfcDescriptor {
    /// `<script>` without `setup` — the options-object form.
    pub script: Option<ScriptBlock>,
    /// `<script setup>` — the literal form.
    pub script_setup: Option<ScriptBlock>,
    pub styles: Vec<StyleBlock>,
    pub template: Option<TemplateBlock>,
}

/// One `<script>` block.
#[derive(Debug, Clone)]
pub struct ScriptBlock {
    pub content: String,
    /// Byte offset of the content in the full component source. Import
    /// injection during the server transform appends right here.
    pub content_start: usize,
    pub setup: bool,
    pub lang: Option<String>,
}

/// One `<style>` block.
#[derive(Debug, Clone)]
pub struct StyleBlock {
    pub content: String,
    /// Position among the component's style blocks, part of its id.
    pub index: usize,
    pub scoped: bool,
    pub module: bool,
    pub src: Option<String>,
    pub lang: Option<String>,
    /// Every attribute as written, in source order, for query reproduction.
    pub attrs: Vec<(String, Option<String>)>,
}

/// The `<template>` block with its parsed element tree.
#[derive(Debug, Clone)]
pub struct TemplateBlock {
    pub content: String,
    /// Byte offset of the content in the full component source.
    pub content_start: usize,
    /// Root nodes; element spans are absolute offsets into the source.
    pub roots: Vec<TemplateNode>,
}

// ---------------------------------------------------------------------------
// Block Scanner
// ---------------------------------------------------------------------------

static BLOCK_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(template|script|style)(\s[^>]*?)?>").expect("block regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_@:.\-][\w@:.\-]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#)
        .expect("attr regex")
});

/// Parse a component source into its block descriptor. Unknown top-level
/// content is skipped; the first `<template>`, first `<script>` of each kind,
/// and every `<style>` are kept.
pub fn parse(source: &str) -> SfcDescriptor {
    let mut descriptor = SfcDescriptor::default();
    let mut style_index = 0usize;
    let mut pos = 0usize;

    while let Some(m) = BLOCK_OPEN_RE.find_at(source, pos) {
        let caps = BLOCK_OPEN_RE
            .captures(&source[m.start()..])
            .expect("find implies captures");
        let tag = caps.get(1).map_or("", |t| t.as_str()).to_ascii_lowercase();
        let attrs = parse_attrs(caps.get(2).map_or("", |a| a.as_str()));

        let content_start = m.end();
        let content_end = match tag.as_str() {
            "template" => find_balanced_template_end(source, content_start),
            _ => find_block_end(source, content_start, &tag),
        };
        let content = &source[content_start..content_end];

        match tag.as_str() {
            "template" => {
                if descriptor.template.is_none() {
                    descriptor.template = Some(TemplateBlock {
                        content: content.to_string(),
                        content_start,
                        roots: template::parse_template(content, content_start),
                    });
                }
            }
            "script" => {
                let setup = has_attr(&attrs, "setup");
                let block = ScriptBlock {
                    content: content.to_string(),
                    content_start,
                    setup,
                    lang: attr_value(&attrs, "lang"),
                };
                if setup {
                    descriptor.script_setup.get_or_insert(block);
                } else {
                    descriptor.script.get_or_insert(block);
                }
            }
            "style" => {
                descriptor.styles.push(StyleBlock {
                    content: content.to_string(),
                    index: style_index,
                    scoped: has_attr(&attrs, "scoped"),
                    module: has_attr(&attrs, "module"),
                    src: attr_value(&attrs, "src"),
                    lang: attr_value(&attrs, "lang"),
                    attrs,
                });
                style_index += 1;
            }
            _ => {}
        }

        // Skip past the closing tag as well.
        pos = skip_close_tag(source, content_end, &tag);
    }

    descriptor
}

fn parse_attrs(raw: &str) -> Vec<(String, Option<String>)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let name = caps.get(1).map_or("", |n| n.as_str()).to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|v| v.as_str().to_string());
            (name, value)
        })
        .collect()
}

fn has_attr(attrs: &[(String, Option<String>)], name: &str) -> bool {
    attrs.iter().any(|(n, _)| n == name)
}

fn attr_value(attrs: &[(String, Option<String>)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, v)| v.clone())
}

/// Script and style content cannot legally contain its own closing tag, so
/// the next occurrence terminates the block.
fn find_block_end(source: &str, from: usize, tag: &str) -> usize {
    let close = format!("</{tag}");
    source[from..]
        .to_ascii_lowercase()
        .find(&close)
        .map_or(source.len(), |idx| from + idx)
}

/// Templates nest (`<template #slot>`), so the close must be balanced.
fn find_balanced_template_end(source: &str, from: usize) -> usize {
    let lower = source.to_ascii_lowercase();
    let mut depth = 1usize;
    let mut pos = from;

    while pos < lower.len() {
        let open = lower[pos..].find("<template");
        let close = lower[pos..].find("</template");
        match (open, close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                pos += o + "<template".len();
            }
            (_, Some(c)) => {
                depth -= 1;
                if depth == 0 {
                    return pos + c;
                }
                pos += c + "</template".len();
            }
            _ => break,
        }
    }
    source.len()
}

fn skip_close_tag(source: &str, content_end: usize, tag: &str) -> usize {
    let close = format!("</{tag}");
    let lower = source[content_end..].to_ascii_lowercase();
    if lower.starts_with(&close) {
        let after = content_end + close.len();
        source[after..]
            .find('>')
            .map_or(source.len(), |idx| after + idx + 1)
    } else {
        content_end
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

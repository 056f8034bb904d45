//! Template element tree with source spans.
//!
//! A tolerant markup parser sufficient for island discovery and element
//! rewriting. Every element records its byte span in the component source, so
//! the server transform can splice replacements without disturbing the rest
//! of the file. Directives (`v-client:load`, `@click`, `:prop`) are ordinary
//! attributes here; their meaning belongs to the external compiler.

// ---------------------------------------------------------------------------
// Node Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Comment(CommentNode),
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: Vec<AttributeNode>,
    pub children: Vec<TemplateNode>,
    /// Span of the whole element, opening `<` to closing `>`, inclusive end.
    pub start: usize,
    pub end: usize,
    /// Offset just past the `>` of the opening tag.
    pub open_tag_end: usize,
    pub self_closing: bool,
}

#[derive(Debug, Clone)]
pub struct AttributeNode {
    pub name: String,
    pub value: Option<String>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct TextNode {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct CommentNode {
    pub start: usize,
    pub end: usize,
}

impl ElementNode {
    pub fn attr(&self, name: &str) -> Option<&AttributeNode> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

/// Elements that never take children and close implicitly.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse template content into a node tree. `base` is the content's byte
/// offset in the full component source; all spans are absolute.
pub fn parse_template(content: &str, base: usize) -> Vec<TemplateNode> {
    Parser {
        bytes: content.as_bytes(),
        content,
        base,
        pos: 0,
    }
    .run()
}

struct Parser<'a> {
    bytes: &'a [u8],
    content: &'a str,
    base: usize,
    pos: usize,
}

struct OpenElement {
    node: ElementNode,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Vec<TemplateNode> {
        let mut roots: Vec<TemplateNode> = Vec::new();
        let mut stack: Vec<OpenElement> = Vec::new();
        let mut text_start = self.pos;

        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.pos += 1;
                continue;
            }

            let flush_end = self.pos;
            if let Some(node) = self.take_text(text_start, flush_end) {
                attach(&mut roots, &mut stack, node);
            }

            if self.content[self.pos..].starts_with("<!--") {
                let start = self.base + self.pos;
                let end = match self.content[self.pos..].find("-->") {
                    Some(idx) => self.pos + idx + 3,
                    None => self.bytes.len(),
                };
                attach(
                    &mut roots,
                    &mut stack,
                    TemplateNode::Comment(CommentNode {
                        start,
                        end: self.base + end,
                    }),
                );
                self.pos = end;
            } else if self.content[self.pos..].starts_with("</") {
                self.close_element(&mut roots, &mut stack);
            } else if self
                .bytes
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_alphabetic())
            {
                self.open_element(&mut roots, &mut stack);
            } else {
                // Literal `<` in text.
                self.pos += 1;
            }
            text_start = self.pos;
        }

        if let Some(node) = self.take_text(text_start, self.bytes.len()) {
            attach(&mut roots, &mut stack, node);
        }

        // Unclosed elements at end of input close implicitly.
        while let Some(open) = stack.pop() {
            let mut node = open.node;
            node.end = self.base + self.bytes.len();
            attach(&mut roots, &mut stack, TemplateNode::Element(node));
        }

        roots
    }

    fn take_text(&self, from: usize, to: usize) -> Option<TemplateNode> {
        if from >= to {
            return None;
        }
        let text = &self.content[from..to];
        if text.trim().is_empty() {
            return None;
        }
        Some(TemplateNode::Text(TextNode {
            content: text.to_string(),
            start: self.base + from,
            end: self.base + to,
        }))
    }

    fn close_element(&mut self, roots: &mut Vec<TemplateNode>, stack: &mut Vec<OpenElement>) {
        let name_start = self.pos + 2;
        let mut cursor = name_start;
        while cursor < self.bytes.len() && !matches!(self.bytes[cursor], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
        {
            cursor += 1;
        }
        let tag = &self.content[name_start..cursor];
        let tag_end = match self.content[cursor..].find('>') {
            Some(idx) => cursor + idx + 1,
            None => self.bytes.len(),
        };

        if let Some(matching) = stack.iter().rposition(|open| open.node.tag == tag) {
            // Anything left open above the match closes implicitly.
            while stack.len() > matching + 1 {
                let open = stack.pop().expect("stack length checked");
                let mut node = open.node;
                node.end = self.base + self.pos;
                attach(roots, stack, TemplateNode::Element(node));
            }
            let open = stack.pop().expect("matching position exists");
            let mut node = open.node;
            node.end = self.base + tag_end;
            attach(roots, stack, TemplateNode::Element(node));
        }
        // A stray closing tag with no open counterpart is dropped.

        self.pos = tag_end;
    }

    fn open_element(&mut self, roots: &mut Vec<TemplateNode>, stack: &mut Vec<OpenElement>) {
        let start = self.pos;
        let name_start = self.pos + 1;
        let mut cursor = name_start;
        while cursor < self.bytes.len()
            && !matches!(self.bytes[cursor], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
        {
            cursor += 1;
        }
        let tag = self.content[name_start..cursor].to_string();

        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            // Skip whitespace.
            while cursor < self.bytes.len() && self.bytes[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            if cursor >= self.bytes.len() {
                break;
            }
            match self.bytes[cursor] {
                b'>' => {
                    cursor += 1;
                    break;
                }
                b'/' => {
                    if self.bytes.get(cursor + 1) == Some(&b'>') {
                        self_closing = true;
                        cursor += 2;
                        break;
                    }
                    cursor += 1;
                }
                _ => {
                    let (attr, next) = self.parse_attr(cursor);
                    attrs.push(attr);
                    cursor = next;
                }
            }
        }

        let open_tag_end = self.base + cursor;
        let node = ElementNode {
            self_closing: self_closing || is_void(&tag),
            tag,
            attrs,
            children: Vec::new(),
            start: self.base + start,
            end: open_tag_end,
            open_tag_end,
        };

        self.pos = cursor;

        if node.self_closing {
            attach(roots, stack, TemplateNode::Element(node));
        } else {
            stack.push(OpenElement { node });
        }
    }

    fn parse_attr(&self, from: usize) -> (AttributeNode, usize) {
        let mut cursor = from;
        while cursor < self.bytes.len()
            && !matches!(self.bytes[cursor], b'=' | b'>' | b' ' | b'\t' | b'\n' | b'\r')
            && !(self.bytes[cursor] == b'/' && self.bytes.get(cursor + 1) == Some(&b'>'))
        {
            cursor += 1;
        }
        let name = self.content[from..cursor].to_string();

        let mut value = None;
        if self.bytes.get(cursor) == Some(&b'=') {
            cursor += 1;
            match self.bytes.get(cursor) {
                Some(&quote @ (b'"' | b'\'')) => {
                    cursor += 1;
                    let value_start = cursor;
                    while cursor < self.bytes.len() && self.bytes[cursor] != quote {
                        cursor += 1;
                    }
                    value = Some(self.content[value_start..cursor].to_string());
                    cursor = (cursor + 1).min(self.bytes.len());
                }
                _ => {
                    let value_start = cursor;
                    while cursor < self.bytes.len()
                        && !matches!(self.bytes[cursor], b'>' | b' ' | b'\t' | b'\n' | b'\r')
                    {
                        cursor += 1;
                    }
                    value = Some(self.content[value_start..cursor].to_string());
                }
            }
        }

        (
            AttributeNode {
                name,
                value,
                start: self.base + from,
                end: self.base + cursor,
            },
            cursor,
        )
    }
}

fn attach(roots: &mut Vec<TemplateNode>, stack: &mut [OpenElement], node: TemplateNode) {
    match stack.last_mut() {
        Some(open) => open.node.children.push(node),
        None => roots.push(node),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(nodes: &[TemplateNode]) -> &ElementNode {
        nodes
            .iter()
            .find_map(|n| match n {
                TemplateNode::Element(el) => Some(el),
                _ => None,
            })
            .expect("an element")
    }

    #[test]
    fn parses_nested_elements() {
        let source = "<div><span>hi</span><Counter v-client:load /></div>";
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        assert_eq!(div.tag, "div");
        assert_eq!(div.start, 0);
        assert_eq!(div.end, source.len());

        let children: Vec<&ElementNode> = div
            .children
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(el) => Some(el),
                _ => None,
            })
            .collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].tag, "span");
        assert_eq!(children[1].tag, "Counter");
        assert!(children[1].self_closing);
        assert!(children[1].has_attr("v-client:load"));
    }

    #[test]
    fn spans_are_offset_by_base() {
        let source = "<p>x</p>";
        let roots = parse_template(source, 100);
        let p = first_element(&roots);
        assert_eq!(p.start, 100);
        assert_eq!(p.end, 108);
    }

    #[test]
    fn quoted_gt_does_not_end_tag() {
        let source = r#"<div :title="a > b">t</div>"#;
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        assert_eq!(div.attr(":title").unwrap().value.as_deref(), Some("a > b"));
        assert_eq!(div.end, source.len());
    }

    #[test]
    fn directive_attributes_keep_full_names() {
        let source = r#"<Counter v-client:load :count="1" @click="go" />"#;
        let roots = parse_template(source, 0);
        let el = first_element(&roots);
        assert!(el.has_attr("v-client:load"));
        assert_eq!(el.attr(":count").unwrap().value.as_deref(), Some("1"));
        assert_eq!(el.attr("@click").unwrap().value.as_deref(), Some("go"));
        assert_eq!(el.attr("v-client:load").unwrap().value, None);
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let source = "<div><img src=\"a.png\"><span>x</span></div>";
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        assert_eq!(div.children.len(), 2);
    }

    #[test]
    fn comments_are_skipped_as_content() {
        let source = "<div><!-- <Counter v-client:load /> --><span/></div>";
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        let elements: Vec<&ElementNode> = div
            .children
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(el) => Some(el),
                _ => None,
            })
            .collect();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag, "span");
    }

    #[test]
    fn unclosed_element_closes_at_end() {
        let source = "<div><span>text";
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        assert_eq!(div.end, source.len());
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn slot_default_content_stays_in_tree() {
        let source = "<div><slot><Counter v-client:load /></slot></div>";
        let roots = parse_template(source, 0);
        let div = first_element(&roots);
        let slot = match &div.children[0] {
            TemplateNode::Element(el) => el,
            other => panic!("expected slot element, got {other:?}"),
        };
        assert_eq!(slot.tag, "slot");
        assert_eq!(slot.children.len(), 1);
    }
}

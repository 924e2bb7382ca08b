//! Serialize a [`Document`] back to markdown.
//!
//! Untouched top-level blocks are copied from the original source, so a
//! document that was only annotated (data attached, no structural edits)
//! round-trips byte-for-byte. After structural edits, the source between
//! top-level blocks (spacing, link reference definitions) is still copied;
//! blocks whose children were edited, and any generated node, are re-emitted
//! from the tree.

use std::ops::Range;

use crate::tree::{Document, NodeId, NodeKind};

impl Document {
    /// Render the document as markdown.
    ///
    /// # Example
    ///
    /// ```
    /// use csb_markdown::{Document, NodeKind};
    ///
    /// let mut doc = Document::parse("Intro\n");
    /// let text = doc.create(NodeKind::Text { value: "Outro".to_owned() });
    /// let paragraph = doc.create_with_children(NodeKind::Paragraph, &[text]);
    /// doc.append_child(doc.root(), paragraph).unwrap();
    ///
    /// assert_eq!(doc.to_markdown(), "Intro\n\nOutro\n");
    /// ```
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let root = self.root();
        if !self.is_modified(root) {
            return self.source.clone();
        }

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        let mut after_generated = false;

        for &child in self.children(root) {
            let node = self.node(child);
            let Some(span) = node.span.clone().or_else(|| node.replaced.clone()) else {
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(&self.block(child, true));
                after_generated = true;
                continue;
            };

            let start = span.start.max(cursor);
            push_gap(&mut out, self.source.get(cursor..start).unwrap_or(""), after_generated);
            out.push_str(&self.block(child, true));
            cursor = start.max(self.trimmed_end(&span));
            after_generated = node.span.is_none();
        }

        let tail = self.source.get(cursor..).unwrap_or("");
        if !after_generated {
            out.push_str(tail);
        } else if !tail.trim().is_empty() {
            push_gap(&mut out, tail, true);
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// End of `span` without its trailing line breaks.
    fn trimmed_end(&self, span: &Range<usize>) -> usize {
        self.source.get(span.clone()).map_or(span.start, |slice| {
            span.start + slice.trim_end_matches(['\n', '\r']).len()
        })
    }

    /// Render a sequence of sibling nodes as block strings.
    ///
    /// Runs of inline siblings (tight list items hold inline content directly)
    /// are joined into a single block.
    fn blocks(&self, children: &[NodeId], from_source: bool) -> Vec<String> {
        let mut blocks = Vec::with_capacity(children.len());
        let mut inline_run = String::new();

        for &child in children {
            if is_inline(self.kind(child)) {
                self.inline(child, &mut inline_run);
                continue;
            }
            if !inline_run.is_empty() {
                blocks.push(std::mem::take(&mut inline_run));
            }
            blocks.push(self.block(child, from_source));
        }
        if !inline_run.is_empty() {
            blocks.push(inline_run);
        }
        blocks
    }

    fn source_slice(&self, id: NodeId) -> Option<&str> {
        let span = self.node(id).span.clone()?;
        self.source
            .get(span)
            .map(|s| s.trim_end_matches(['\n', '\r']))
    }

    fn block(&self, id: NodeId, from_source: bool) -> String {
        let node = self.node(id);
        if (from_source && !node.modified) || node.kind == NodeKind::Other {
            if let Some(slice) = self.source_slice(id) {
                return slice.to_owned();
            }
        }

        match &node.kind {
            NodeKind::Heading { depth } => {
                let mut out = "#".repeat(usize::from(*depth));
                out.push(' ');
                self.inline_children(id, &mut out);
                out
            }
            NodeKind::Code { lang, meta, value } => {
                render_code(lang.as_deref(), meta.as_deref(), value)
            }
            NodeKind::Html { value } => value.trim_end_matches('\n').to_owned(),
            NodeKind::BlockQuote => {
                let inner = self.blocks(node.children(), false).join("\n\n");
                inner
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_owned()
                        } else {
                            format!("> {line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            NodeKind::List { start } => self.list(node.children(), *start),
            NodeKind::ThematicBreak => "---".to_owned(),
            NodeKind::Root | NodeKind::ListItem | NodeKind::Other => {
                self.blocks(node.children(), false).join("\n\n")
            }
            _ => {
                let mut out = String::new();
                self.inline(id, &mut out);
                out
            }
        }
    }

    fn list(&self, items: &[NodeId], start: Option<u64>) -> String {
        let tight = items.iter().all(|&item| {
            self.children(item)
                .iter()
                .all(|&c| self.kind(c) != &NodeKind::Paragraph)
        });
        let item_separator = if tight { "\n" } else { "\n\n" };
        let block_separator = if tight { "\n" } else { "\n\n" };

        let mut number = start;
        let rendered: Vec<String> = items
            .iter()
            .map(|&item| {
                let marker = match number {
                    Some(n) => {
                        number = Some(n + 1);
                        format!("{n}. ")
                    }
                    None => "- ".to_owned(),
                };
                let indent = " ".repeat(marker.len());
                let content = self.blocks(self.children(item), false).join(block_separator);

                let mut out = String::new();
                for (i, line) in content.lines().enumerate() {
                    if i == 0 {
                        out.push_str(&marker);
                    } else {
                        out.push('\n');
                        if !line.is_empty() {
                            out.push_str(&indent);
                        }
                    }
                    out.push_str(line);
                }
                if out.is_empty() {
                    out.push_str(marker.trim_end());
                }
                out
            })
            .collect();

        rendered.join(item_separator)
    }

    fn inline_children(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            self.inline(child, out);
        }
    }

    fn inline(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text { value } => push_escaped(value, out),
            NodeKind::Html { value } => out.push_str(value),
            NodeKind::InlineCode { value } => {
                if value.contains('`') {
                    out.push_str("`` ");
                    out.push_str(value);
                    out.push_str(" ``");
                } else {
                    out.push('`');
                    out.push_str(value);
                    out.push('`');
                }
            }
            NodeKind::Emphasis => self.wrapped(id, "*", out),
            NodeKind::Strong => self.wrapped(id, "**", out),
            NodeKind::Strikethrough => self.wrapped(id, "~~", out),
            NodeKind::Link { url, title } => {
                out.push('[');
                self.inline_children(id, out);
                out.push_str("](");
                push_destination(url, title, out);
                out.push(')');
            }
            NodeKind::Image { url, alt, title } => {
                out.push_str("![");
                out.push_str(alt);
                out.push_str("](");
                push_destination(url, title, out);
                out.push(')');
            }
            NodeKind::Break => out.push_str("\\\n"),
            NodeKind::Other => match self.source_slice(id) {
                Some(slice) => out.push_str(slice),
                None => self.inline_children(id, out),
            },
            _ => self.inline_children(id, out),
        }
    }

    fn wrapped(&self, id: NodeId, marker: &str, out: &mut String) {
        out.push_str(marker);
        self.inline_children(id, out);
        out.push_str(marker);
    }
}

/// Whether a node renders inline (inside a paragraph-level line).
fn is_inline(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Text { .. }
        | NodeKind::InlineCode { .. }
        | NodeKind::Emphasis
        | NodeKind::Strong
        | NodeKind::Strikethrough
        | NodeKind::Link { .. }
        | NodeKind::Image { .. }
        | NodeKind::Break => true,
        NodeKind::Html { value } => !value.contains('\n'),
        _ => false,
    }
}

/// Copy source text found between two top-level blocks.
///
/// After a generated block the gap must open with a blank line, or the
/// following source would continue the generated block.
fn push_gap(out: &mut String, gap: &str, after_generated: bool) {
    if !after_generated {
        out.push_str(gap);
        return;
    }
    out.push_str("\n\n");
    out.push_str(gap.trim_start_matches(['\n', '\r']));
}

/// Push text with markdown punctuation backslash-escaped.
fn push_escaped(text: &str, out: &mut String) {
    let mut line_start = true;
    for c in text.chars() {
        let special = matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '&' | '~')
            || (line_start && matches!(c, '#' | '>' | '-' | '+'));
        if special {
            out.push('\\');
        }
        out.push(c);
        line_start = c == '\n';
    }
}

fn push_destination(url: &str, title: &str, out: &mut String) {
    if url.contains(' ') {
        out.push('<');
        out.push_str(url);
        out.push('>');
    } else {
        out.push_str(url);
    }
    if !title.is_empty() {
        out.push_str(" \"");
        out.push_str(&title.replace('"', "\\\""));
        out.push('"');
    }
}

/// Render a fenced code block, lengthening the fence past any backtick run
/// inside the value.
fn render_code(lang: Option<&str>, meta: Option<&str>, value: &str) -> String {
    let longest_run = value
        .lines()
        .map(|line| line.trim_start().chars().take_while(|&c| c == '`').count())
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);

    let mut out = fence.clone();
    if let Some(lang) = lang {
        out.push_str(lang);
        if let Some(meta) = meta {
            out.push(' ');
            out.push_str(meta);
        }
    }
    out.push('\n');
    if !value.is_empty() {
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

//! Build a [`Document`] tree from pulldown-cmark events.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use crate::tree::{Document, Node, NodeId, NodeKind};
use crate::util::{heading_level_to_num, split_fence_info};

/// Default parser options: GitHub Flavored Markdown.
#[must_use]
pub fn default_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_GFM
}

impl Document {
    /// Parse markdown with GFM options.
    ///
    /// # Example
    ///
    /// ```
    /// use csb_markdown::{Document, NodeKind};
    ///
    /// let doc = Document::parse("# Title\n\n```jsx codesandbox=react\nrender();\n```\n");
    /// let code = doc.children(doc.root())[1];
    /// assert!(matches!(
    ///     doc.kind(code),
    ///     NodeKind::Code { meta: Some(meta), .. } if meta == "codesandbox=react"
    /// ));
    /// ```
    #[must_use]
    pub fn parse(markdown: &str) -> Self {
        Self::parse_with_options(markdown, default_options())
    }

    /// Parse markdown with explicit parser options.
    #[must_use]
    pub fn parse_with_options(markdown: &str, options: Options) -> Self {
        let mut builder = TreeBuilder::new(markdown);
        for (event, range) in Parser::new_ext(markdown, options).into_offset_iter() {
            builder.event(event, range);
        }
        builder.doc
    }
}

/// Incremental tree construction state.
struct TreeBuilder {
    doc: Document,
    /// Open containers, innermost last. Always starts with the root.
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn new(markdown: &str) -> Self {
        let doc = Document::with_source(markdown.to_owned());
        let root = doc.root();
        Self {
            doc,
            stack: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.root())
    }

    /// Allocate a node with a source span and attach it to the current container.
    fn attach(&mut self, kind: NodeKind, range: std::ops::Range<usize>) -> NodeId {
        let parent = self.current();
        let mut node = Node::new(kind, Some(range));
        node.parent = Some(parent);
        let id = self.doc.alloc(node);
        self.doc.nodes[parent.index()].children.push(id);
        id
    }

    /// Nearest open image, whose text events become alt text.
    fn open_image(&self) -> Option<NodeId> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|&id| matches!(self.doc.kind(id), NodeKind::Image { .. }))
    }

    fn event(&mut self, event: Event<'_>, range: std::ops::Range<usize>) {
        match event {
            Event::Start(tag) => {
                let kind = tag_kind(tag);
                let id = self.attach(kind, range);
                self.stack.push(id);
            }
            Event::End(_) => {
                // Never pop the root.
                if self.stack.len() <= 1 {
                    return;
                }
                let Some(id) = self.stack.pop() else {
                    return;
                };
                if let NodeKind::Code { value, .. } = &mut self.doc.nodes[id.index()].kind
                    && value.ends_with('\n')
                {
                    value.pop();
                }
            }
            Event::Text(text) => self.text(&text, range),
            Event::Code(code) => {
                if let Some(image) = self.open_image() {
                    push_alt(&mut self.doc, image, &code);
                } else {
                    self.attach(
                        NodeKind::InlineCode {
                            value: code.into_string(),
                        },
                        range,
                    );
                }
            }
            Event::Html(html) => {
                let current = self.current();
                if let NodeKind::Html { value } = &mut self.doc.nodes[current.index()].kind {
                    value.push_str(&html);
                } else {
                    self.attach(
                        NodeKind::Html {
                            value: html.into_string(),
                        },
                        range,
                    );
                }
            }
            Event::InlineHtml(html) => {
                self.attach(
                    NodeKind::Html {
                        value: html.into_string(),
                    },
                    range,
                );
            }
            Event::SoftBreak => self.text("\n", range),
            Event::HardBreak => {
                self.attach(NodeKind::Break, range);
            }
            Event::Rule => {
                self.attach(NodeKind::ThematicBreak, range);
            }
            _ => {
                self.attach(NodeKind::Other, range);
            }
        }
    }

    fn text(&mut self, text: &str, range: std::ops::Range<usize>) {
        let current = self.current();
        if let NodeKind::Code { value, .. } = &mut self.doc.nodes[current.index()].kind {
            value.push_str(text);
            return;
        }
        if let Some(image) = self.open_image() {
            push_alt(&mut self.doc, image, text);
            return;
        }
        self.attach(
            NodeKind::Text {
                value: text.to_owned(),
            },
            range,
        );
    }
}

fn push_alt(doc: &mut Document, image: NodeId, text: &str) {
    if let NodeKind::Image { alt, .. } = &mut doc.nodes[image.index()].kind {
        alt.push_str(text);
    }
}

/// Map a container tag to a node kind.
fn tag_kind(tag: Tag<'_>) -> NodeKind {
    match tag {
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::Heading { level, .. } => NodeKind::Heading {
            depth: heading_level_to_num(level),
        },
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
            let (lang, meta) = split_fence_info(&info);
            NodeKind::Code {
                lang,
                meta,
                value: String::new(),
            }
        }
        Tag::CodeBlock(CodeBlockKind::Indented) => NodeKind::Code {
            lang: None,
            meta: None,
            value: String::new(),
        },
        Tag::HtmlBlock => NodeKind::Html {
            value: String::new(),
        },
        Tag::List(start) => NodeKind::List { start },
        Tag::Item => NodeKind::ListItem,
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Link {
            dest_url, title, ..
        } => NodeKind::Link {
            url: dest_url.into_string(),
            title: title.into_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => NodeKind::Image {
            url: dest_url.into_string(),
            alt: String::new(),
            title: title.into_string(),
        },
        _ => NodeKind::Other,
    }
}

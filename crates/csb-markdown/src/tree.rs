//! Arena-backed document tree.
//!
//! Nodes live in a single `Vec` owned by [`Document`] and are addressed by
//! [`NodeId`]. Parent → children is an ordered `Vec<NodeId>`, so structural
//! edits are explicit sequence operations ([`Document::insert_at`],
//! [`Document::replace_at`]) instead of pointer splicing. Ids stay valid for the
//! lifetime of the document; replaced nodes are detached, never freed.

use std::collections::BTreeMap;
use std::ops::Range;

/// Index of a node inside a [`Document`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node type with its kind-specific payload (mdast vocabulary).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Heading {
        depth: u8,
    },
    Paragraph,
    BlockQuote,
    List {
        /// Start number for ordered lists, `None` for bullet lists.
        start: Option<u64>,
    },
    ListItem,
    /// Fenced or indented code block.
    Code {
        lang: Option<String>,
        meta: Option<String>,
        /// Block content without the trailing newline.
        value: String,
    },
    /// Raw HTML, block or inline.
    Html {
        value: String,
    },
    Text {
        value: String,
    },
    InlineCode {
        value: String,
    },
    Emphasis,
    Strong,
    Strikethrough,
    Link {
        url: String,
        title: String,
    },
    Image {
        url: String,
        alt: String,
        title: String,
    },
    Break,
    ThematicBreak,
    /// Anything the tree does not model (tables, footnotes, ...).
    ///
    /// Serialized from its original source span.
    Other,
}

impl NodeKind {
    /// Whether this is a code block node.
    #[must_use]
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code { .. })
    }
}

/// Auxiliary data attached to a node by transforms.
///
/// `fields` mirrors mdast's `node.data`; `h_properties` holds attributes
/// that an HTML renderer should put on the element (`node.data.hProperties`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeData {
    pub fields: BTreeMap<String, String>,
    pub h_properties: BTreeMap<String, String>,
}

impl NodeData {
    /// Whether no data has been attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.h_properties.is_empty()
    }
}

/// A single node in the arena.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub data: NodeData,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    /// Byte range in the source markdown; `None` for generated nodes.
    pub(crate) span: Option<Range<usize>>,
    /// Source span of the node this one replaced.
    pub(crate) replaced: Option<Range<usize>>,
    /// Set when the node's children were structurally edited.
    pub(crate) modified: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, span: Option<Range<usize>>) -> Self {
        Self {
            kind,
            data: NodeData::default(),
            children: Vec::new(),
            parent: None,
            span,
            replaced: None,
            modified: false,
        }
    }

    /// Ordered child ids.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent id, `None` for the root and detached nodes.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Error from a structural tree edit.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    /// Child index past the end of the parent's children.
    #[error("index {index} out of bounds for node {parent:?} with {len} children")]
    OutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },
    /// The anchor node is not a child of the given parent.
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    /// The inserted node is already attached somewhere.
    #[error("node {0:?} is already attached to a parent")]
    AlreadyAttached(NodeId),
}

/// A parsed markdown document.
///
/// Holds the original source so that untouched blocks serialize back
/// byte-for-byte (see [`Document::to_markdown`]).
#[derive(Clone, Debug)]
pub struct Document {
    pub(crate) source: String,
    pub(crate) nodes: Vec<Node>,
}

impl Document {
    /// Create an empty document with only a root node.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(String::new())
    }

    pub(crate) fn with_source(source: String) -> Self {
        let span = Some(0..source.len());
        Self {
            source,
            nodes: vec![Node::new(NodeKind::Root, span)],
        }
    }

    /// Id of the root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Original markdown source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of nodes in the arena, including detached ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the root has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Ordered children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Attached data of a node.
    #[must_use]
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    /// Mutable attached data of a node.
    ///
    /// Data never affects serialization, so this does not mark the node modified.
    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0].data
    }

    /// Allocate a detached node. Attach it with [`append_child`](Self::append_child),
    /// [`insert_at`](Self::insert_at) or [`replace_at`](Self::replace_at).
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.alloc(Node::new(kind, None))
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Allocate a detached node with the given children already attached.
    ///
    /// Children that already have a parent are skipped.
    pub fn create_with_children(&mut self, kind: NodeKind, children: &[NodeId]) -> NodeId {
        let id = self.create(kind);
        for &child in children {
            if self.nodes[child.0].parent.is_none() && child != self.root() {
                self.nodes[child.0].parent = Some(id);
                self.nodes[id.0].children.push(child);
            }
        }
        id
    }

    /// Append a detached node to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let len = self.nodes[parent.0].children.len();
        self.insert_at(parent, len, child)
    }

    /// Position of `child` among `parent`'s children.
    #[must_use]
    pub fn position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.0].children.iter().position(|&c| c == child)
    }

    /// Insert a detached node at `index` in `parent`'s children.
    pub fn insert_at(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        if self.nodes[child.0].parent.is_some() || child == self.root() {
            return Err(TreeError::AlreadyAttached(child));
        }
        let len = self.nodes[parent.0].children.len();
        if index > len {
            return Err(TreeError::OutOfBounds { parent, index, len });
        }

        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        self.mark_modified(parent);
        Ok(())
    }

    /// Replace the child at `index` with a detached node.
    ///
    /// Returns the id of the removed node, which becomes detached.
    pub fn replace_at(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<NodeId, TreeError> {
        if self.nodes[child.0].parent.is_some() || child == self.root() {
            return Err(TreeError::AlreadyAttached(child));
        }
        let len = self.nodes[parent.0].children.len();
        if index >= len {
            return Err(TreeError::OutOfBounds { parent, index, len });
        }

        let old = std::mem::replace(&mut self.nodes[parent.0].children[index], child);
        self.nodes[old.0].parent = None;
        let replaced = self.nodes[old.0]
            .span
            .clone()
            .or_else(|| self.nodes[old.0].replaced.clone());
        self.nodes[child.0].replaced = replaced;
        self.nodes[child.0].parent = Some(parent);
        self.mark_modified(parent);
        Ok(old)
    }

    /// Insert a detached node right after `anchor` in `parent`'s children.
    ///
    /// Returns the index the node was inserted at.
    pub fn insert_after(
        &mut self,
        parent: NodeId,
        anchor: NodeId,
        child: NodeId,
    ) -> Result<usize, TreeError> {
        let index = self.position(parent, anchor).ok_or(TreeError::NotAChild {
            parent,
            child: anchor,
        })?;
        self.insert_at(parent, index + 1, child)?;
        Ok(index + 1)
    }

    /// Replace `old` with a detached node, keeping its position.
    ///
    /// Returns the index of the replaced slot.
    pub fn replace(
        &mut self,
        parent: NodeId,
        old: NodeId,
        child: NodeId,
    ) -> Result<usize, TreeError> {
        let index = self
            .position(parent, old)
            .ok_or(TreeError::NotAChild { parent, child: old })?;
        self.replace_at(parent, index, child)?;
        Ok(index)
    }

    /// Mark `id` and all its ancestors as structurally modified.
    fn mark_modified(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.nodes[node.0].modified = true;
            current = self.nodes[node.0].parent;
        }
    }

    /// Whether the node or anything beneath it was structurally edited.
    #[must_use]
    pub fn is_modified(&self, id: NodeId) -> bool {
        self.nodes[id.0].modified
    }

    /// Pre-order traversal of all attached nodes.
    ///
    /// Yields `(node, parent)` pairs in document order, starting with the root.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![(self.root(), None)],
        }
    }

    /// Flattened text content of a node (mdast `toString`).
    ///
    /// Concatenates text, inline code, code and image alt values.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text { value }
            | NodeKind::InlineCode { value }
            | NodeKind::Code { value, .. } => out.push_str(value),
            NodeKind::Image { alt, .. } => out.push_str(alt),
            _ => {
                for &child in &self.nodes[id.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order iterator over `(node, parent)` pairs.
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<(NodeId, Option<NodeId>)>,
}

impl Iterator for Descendants<'_> {
    type Item = (NodeId, Option<NodeId>);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, parent) = self.stack.pop()?;
        let children = &self.doc.nodes[id.0].children;
        self.stack
            .extend(children.iter().rev().map(|&child| (child, Some(id))));
        Some((id, parent))
    }
}

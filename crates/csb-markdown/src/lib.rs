//! Markdown document tree for csb.
//!
//! This crate provides the document model that sandbox transforms walk and
//! mutate:
//! - [`Document`]: arena of [`Node`]s addressed by [`NodeId`]
//! - [`Document::parse`]: build the tree from pulldown-cmark events
//! - [`Document::to_markdown`]: serialize back, copying untouched blocks
//!   verbatim from the source
//!
//! # Architecture
//!
//! Node kinds follow the mdast vocabulary (`code`, `paragraph`, `link`,
//! `image`, `html`, ...). Parent → children is an ordered list of ids, so
//! inserting after or replacing a node are explicit sequence operations.
//!
//! # Example
//!
//! ```
//! use csb_markdown::{Document, NodeKind};
//!
//! let mut doc = Document::parse("```js\nconsole.log(1);\n```\n");
//! let root = doc.root();
//! let code = doc.children(root)[0];
//!
//! let html = doc.create(NodeKind::Html { value: "<iframe></iframe>".to_owned() });
//! doc.replace(root, code, html).unwrap();
//!
//! assert_eq!(doc.to_markdown(), "<iframe></iframe>\n");
//! ```

mod parse;
mod serialize;
mod tree;
mod util;

pub use parse::default_options;
pub use tree::{Descendants, Document, Node, NodeData, NodeId, NodeKind, TreeError};

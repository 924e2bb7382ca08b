//! Sandbox creation for annotated markdown code blocks.
//!
//! Fenced code blocks whose info string carries a directive such as
//! `codesandbox=react?module=/src/App.js` are turned into online sandboxes:
//! the named template is resolved, the block source is written into the
//! template's entry file, and the document is rewritten to expose the
//! sandbox link.
//!
//! # Components
//!
//! - [`parse_directive`] / [`SandboxDirective`]: read the info string
//! - [`merge_query`] / [`merge_style`]: combine URL options and iframe styles
//! - [`TemplateResolver`]: custom templates, `file:` directories and
//!   remote sandboxes, memoized in a [`TemplateCache`]
//! - [`SandboxTransformer`]: walk a document and apply the [`Mode`]
//! - [`SandboxApi`]: hosting service seam, implemented by [`CodeSandboxClient`]
//!   (and `MockSandboxApi` behind the `mock` feature)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use csb_markdown::Document;
//! use csb_sandbox::{CodeSandboxClient, Mode, SandboxTransformer};
//!
//! let transformer = SandboxTransformer::new(Arc::new(CodeSandboxClient::default()))
//!     .mode(Mode::Iframe)
//!     .auto_deploy(true);
//!
//! let mut doc = Document::parse(markdown);
//! transformer.transform(&mut doc, Some(path))?;
//! ```

mod api;
mod consts;
mod define;
mod directive;
mod error;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod query;
mod resolver;
mod style;
mod template;
mod transform;

pub use api::{CodeSandboxClient, DirectoryRecord, ModuleRecord, SandboxApi, SandboxData};
pub use consts::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use define::{compress_to_base64, define_parameters, define_url};
pub use directive::{SandboxDirective, parse_directive, split_template_and_query};
pub use error::{ApiError, SandboxError};
pub use local::{FsTemplateReader, LocalTemplate, LocalTemplateReader};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockSandboxApi;
pub use query::{MergedQuery, QuerySource, merge_optional, merge_query};
pub use resolver::{TemplateCache, TemplateResolver};
pub use style::{merge_style, parse_style};
pub use template::{CustomTemplate, CustomTemplates, EntryOverride, Template, to_base_path};
pub use transform::{
    CreatedSandbox, Mode, SandboxTransformer, TransformOptions, TransformReport, UnknownMode,
};

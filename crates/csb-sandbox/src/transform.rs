//! Sandbox transform over a markdown document.
//!
//! [`SandboxTransformer`] walks a [`Document`] once, collecting the first
//! top-level heading (used as sandbox title) and every code block. Blocks
//! carrying a `codesandbox=` directive are then processed one at a time:
//! the template is resolved, the block source is merged into it, a sandbox
//! link is produced and the tree is rewritten according to the [`Mode`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use csb_markdown::{Document, NodeId, NodeKind};

use crate::api::SandboxApi;
use crate::consts::{
    BADGE_ALT, BADGE_PATH, DEFAULT_BASE_URL, IFRAME_ALLOW, IFRAME_DEFAULT_QUERY, IFRAME_SANDBOX,
    IFRAME_STYLE, MODULE_QUERY_KEY, OVERRIDE_ENTRY_KEY, STYLE_KEY,
};
use crate::define::{define_parameters, define_url};
use crate::directive::{SandboxDirective, parse_directive};
use crate::error::SandboxError;
use crate::local::{FsTemplateReader, LocalTemplateReader};
use crate::query::{MergedQuery, QuerySource, merge_query};
use crate::resolver::{TemplateCache, TemplateResolver};
use crate::style::merge_style;
use crate::template::{CustomTemplates, EntryOverride};

/// How a processed code block is exposed in the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Attach the sandbox URL to the code node's data.
    #[default]
    Meta,
    /// Insert a badge link right after the code block.
    Button,
    /// Replace the code block with an embedded iframe.
    Iframe,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Button => "button",
            Self::Iframe => "iframe",
        }
    }

    /// Query applied when none is configured.
    #[must_use]
    pub fn default_query(self) -> MergedQuery {
        match self {
            Self::Iframe => IFRAME_DEFAULT_QUERY.iter().copied().collect(),
            Self::Meta | Self::Button => MergedQuery::new(),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized mode name.
#[derive(Debug, thiserror::Error)]
#[error("unknown mode \"{0}\", expected meta, button or iframe")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(Self::Meta),
            "button" => Ok(Self::Button),
            "iframe" => Ok(Self::Iframe),
            other => Err(UnknownMode(other.to_owned())),
        }
    }
}

/// Options fixed for one transform run.
#[derive(Clone, Debug)]
pub struct TransformOptions {
    pub mode: Mode,
    /// Hosting service URL used for links and badge images.
    pub base_url: String,
    /// Base query; replaces the mode's default query when set.
    pub query: Option<QuerySource>,
    /// Style merged onto the iframe style.
    pub style: Option<String>,
    /// Create sandboxes through the API instead of emitting define links.
    pub auto_deploy: bool,
    pub custom_templates: CustomTemplates,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            query: None,
            style: None,
            auto_deploy: false,
            custom_templates: CustomTemplates::builtin(),
        }
    }
}

/// A sandbox produced for one code block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedSandbox {
    /// Template id named by the block.
    pub template_id: String,
    pub url: String,
    /// Set when the sandbox was created through the API.
    pub sandbox_id: Option<String>,
}

/// Summary of one transform run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Text of the document's first top-level heading.
    pub title: Option<String>,
    pub sandboxes: Vec<CreatedSandbox>,
}

impl TransformReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }
}

/// Links to a sandbox.
struct SandboxLinks {
    sandbox_id: Option<String>,
    url: String,
    embed_url: String,
}

/// Code blocks and title found in one pass over the document.
struct Scan {
    title: Option<String>,
    /// `(code, parent)` pairs in document order.
    blocks: Vec<(NodeId, NodeId)>,
}

fn scan(doc: &Document) -> Scan {
    let mut title = None;
    let mut blocks = Vec::new();

    for (id, parent) in doc.descendants() {
        match doc.kind(id) {
            NodeKind::Heading { depth: 1 } if title.is_none() => {
                let text = doc.text_content(id);
                if !text.is_empty() {
                    title = Some(text);
                }
            }
            NodeKind::Code { .. } => {
                if let Some(parent) = parent {
                    blocks.push((id, parent));
                }
            }
            _ => {}
        }
    }

    Scan { title, blocks }
}

/// Rewrites sandbox code blocks of markdown documents.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use csb_markdown::Document;
/// use csb_sandbox::{CodeSandboxClient, Mode, SandboxTransformer};
///
/// let transformer = SandboxTransformer::new(Arc::new(CodeSandboxClient::default()))
///     .mode(Mode::Button);
///
/// let mut doc = Document::parse("```jsx codesandbox=react\nrender(<App />);\n```\n");
/// let report = transformer.transform(&mut doc, None)?;
/// println!("{}", doc.to_markdown());
/// ```
pub struct SandboxTransformer {
    options: TransformOptions,
    api: Arc<dyn SandboxApi>,
    local: Option<Arc<dyn LocalTemplateReader>>,
    working_dir: PathBuf,
}

impl SandboxTransformer {
    /// Create a transformer with default options and local file templates enabled.
    #[must_use]
    pub fn new(api: Arc<dyn SandboxApi>) -> Self {
        Self::with_options(api, TransformOptions::default())
    }

    #[must_use]
    pub fn with_options(api: Arc<dyn SandboxApi>, options: TransformOptions) -> Self {
        Self {
            options,
            api,
            local: Some(Arc::new(FsTemplateReader::new())),
            working_dir: std::env::current_dir().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.options.mode = mode;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.options.base_url = base_url.into();
        self
    }

    /// Set the base query, replacing the mode's default.
    #[must_use]
    pub fn query(mut self, query: impl Into<QuerySource>) -> Self {
        self.options.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.options.style = Some(style.into());
        self
    }

    #[must_use]
    pub fn auto_deploy(mut self, auto_deploy: bool) -> Self {
        self.options.auto_deploy = auto_deploy;
        self
    }

    #[must_use]
    pub fn custom_templates(mut self, templates: CustomTemplates) -> Self {
        self.options.custom_templates = templates;
        self
    }

    /// Set the reader for `file:` templates; `None` disables them.
    #[must_use]
    pub fn local_reader(mut self, reader: Option<Arc<dyn LocalTemplateReader>>) -> Self {
        self.local = reader;
        self
    }

    /// Directory that custom `file:` templates resolve against.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    #[must_use]
    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Transform one document with a fresh template cache.
    ///
    /// `path` is the document's location, used for relative `file:` templates.
    ///
    /// # Errors
    ///
    /// Returns the first [`SandboxError`]; blocks after it are left untouched.
    pub fn transform(
        &self,
        doc: &mut Document,
        path: Option<&Path>,
    ) -> Result<TransformReport, SandboxError> {
        let mut cache = TemplateCache::new();
        self.transform_with_cache(doc, path, &mut cache)
    }

    /// Transform one document, sharing `cache` with other documents.
    ///
    /// # Errors
    ///
    /// Returns the first [`SandboxError`]; blocks after it are left untouched.
    pub fn transform_with_cache(
        &self,
        doc: &mut Document,
        path: Option<&Path>,
        cache: &mut TemplateCache,
    ) -> Result<TransformReport, SandboxError> {
        let Scan { title, blocks } = scan(doc);

        let document_dir = path.and_then(Path::parent).map(|dir| {
            if dir.as_os_str().is_empty() {
                self.working_dir.as_path()
            } else {
                dir
            }
        });
        let resolver = TemplateResolver::new(
            self.api.as_ref(),
            &self.options.custom_templates,
            &self.working_dir,
        )
        .with_local_reader(self.local.as_deref())
        .with_document_dir(document_dir);

        let mut report = TransformReport {
            title,
            sandboxes: Vec::new(),
        };
        for (code, parent) in blocks {
            let created = self.process_block(
                doc,
                code,
                parent,
                report.title.as_deref(),
                &resolver,
                cache,
            )?;
            report.sandboxes.extend(created);
        }
        Ok(report)
    }

    fn process_block(
        &self,
        doc: &mut Document,
        code: NodeId,
        parent: NodeId,
        document_title: Option<&str>,
        resolver: &TemplateResolver<'_>,
        cache: &mut TemplateCache,
    ) -> Result<Option<CreatedSandbox>, SandboxError> {
        let NodeKind::Code { meta, value, .. } = doc.kind(code) else {
            return Ok(None);
        };
        let attributes = parse_directive(meta.as_deref().unwrap_or_default());
        let Some(directive) = SandboxDirective::from_attributes(&attributes) else {
            return Ok(None);
        };
        let source = value.clone();

        tracing::debug!(template = %directive.template_id, "Processing sandbox directive");
        let template = resolver.resolve(cache, &directive.template_id)?;

        let mut query = self.base_query();
        if let Some(raw) = &directive.query {
            query.merge(&QuerySource::Raw(raw.clone()));
        }
        let entry_override = query
            .remove(OVERRIDE_ENTRY_KEY)
            .map_or(EntryOverride::Replace, |value| {
                EntryOverride::parse(&value).unwrap_or_else(|| {
                    tracing::warn!(value = %value, "Ignoring invalid overrideEntry");
                    EntryOverride::Replace
                })
            });
        if !query.has(MODULE_QUERY_KEY) {
            query.set(MODULE_QUERY_KEY, template.module_path());
        }

        let files = template.files_with_entry(&source, entry_override);
        let title = template.display_title(document_title).to_owned();
        let parameters = define_parameters(&files)?;
        let links = self.create_sandbox(&directive.template_id, &parameters, &query)?;

        match self.options.mode {
            Mode::Meta => annotate(doc, code, &links.url, &title),
            Mode::Button => {
                let badge = self.badge(doc, &links.url);
                doc.insert_after(parent, code, badge)?;
            }
            Mode::Iframe => {
                let style = self.iframe_style(&attributes);
                let html = doc.create(NodeKind::Html {
                    value: iframe_html(&links.embed_url, &style, &title),
                });
                doc.replace(parent, code, html)?;
            }
        }

        Ok(Some(CreatedSandbox {
            template_id: directive.template_id,
            url: links.url,
            sandbox_id: links.sandbox_id,
        }))
    }

    fn base_query(&self) -> MergedQuery {
        match &self.options.query {
            Some(source) => merge_query([source]),
            None => self.options.mode.default_query(),
        }
    }

    fn base(&self) -> &str {
        self.options.base_url.trim_end_matches('/')
    }

    fn create_sandbox(
        &self,
        template_id: &str,
        parameters: &str,
        query: &MergedQuery,
    ) -> Result<SandboxLinks, SandboxError> {
        let base = self.base();
        if !self.options.auto_deploy {
            return Ok(SandboxLinks {
                sandbox_id: None,
                url: define_url(base, parameters, query, false),
                embed_url: define_url(base, parameters, query, true),
            });
        }

        let id = self.api.define_sandbox(parameters).map_err(|source| {
            tracing::error!(template = template_id, error = %source, "Failed to create sandbox");
            SandboxError::SandboxCreate {
                template_id: template_id.to_owned(),
                source,
            }
        })?;
        tracing::info!(sandbox = %id, template = template_id, "Created sandbox");

        let query = query.to_query_string();
        Ok(SandboxLinks {
            url: format!("{base}/s/{id}?{query}"),
            embed_url: format!("{base}/embed/{id}?{query}"),
            sandbox_id: Some(id),
        })
    }

    /// Paragraph holding a link around the badge image.
    fn badge(&self, doc: &mut Document, url: &str) -> NodeId {
        let image = doc.create(NodeKind::Image {
            url: format!("{}{BADGE_PATH}", self.base()),
            alt: BADGE_ALT.to_owned(),
            title: String::new(),
        });
        let link = doc.create_with_children(
            NodeKind::Link {
                url: url.to_owned(),
                title: String::new(),
            },
            &[image],
        );
        doc.create_with_children(NodeKind::Paragraph, &[link])
    }

    /// Iframe style: configured style, then the block's `style=` attribute.
    fn iframe_style(&self, attributes: &HashMap<String, String>) -> String {
        let overrides: Vec<&str> = self
            .options
            .style
            .as_deref()
            .into_iter()
            .chain(attributes.get(STYLE_KEY).map(String::as_str))
            .collect();
        if overrides.is_empty() {
            return IFRAME_STYLE.to_owned();
        }
        overrides
            .into_iter()
            .fold(IFRAME_STYLE.to_owned(), |style, o| merge_style(&style, o))
    }
}

fn annotate(doc: &mut Document, code: NodeId, url: &str, title: &str) {
    let data = doc.data_mut(code);
    data.fields
        .insert("codesandboxUrl".to_owned(), url.to_owned());
    data.h_properties
        .insert("data-codesandbox-url".to_owned(), url.to_owned());
    if !title.is_empty() {
        data.h_properties
            .insert("data-codesandbox-title".to_owned(), title.to_owned());
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn iframe_html(src: &str, style: &str, title: &str) -> String {
    format!(
        "<iframe\n  src=\"{src}\"\n  style=\"{style}\"\n  title=\"{title}\"\n  allow=\"{IFRAME_ALLOW}\"\n  sandbox=\"{IFRAME_SANDBOX}\"\n></iframe>",
        style = escape_attribute(style),
        title = escape_attribute(title),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSandboxApi;
    use crate::template::CustomTemplate;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn api() -> Arc<MockSandboxApi> {
        Arc::new(
            MockSandboxApi::new()
                .with_template(
                    "new",
                    "/src/index.js",
                    &[
                        ("package.json", "{\"main\": \"src/index.js\"}"),
                        ("src/index.js", "base"),
                        ("src/App.js", "line1\nline2\nline3"),
                    ],
                )
                .with_title("new", "React"),
        )
    }

    fn transformer(api: &Arc<MockSandboxApi>, mode: Mode) -> SandboxTransformer {
        SandboxTransformer::new(Arc::clone(api) as Arc<dyn SandboxApi>)
            .mode(mode)
            .auto_deploy(true)
            .working_dir("/work")
    }

    fn root_kinds(doc: &Document) -> Vec<&NodeKind> {
        doc.children(doc.root())
            .iter()
            .map(|&id| doc.kind(id))
            .collect()
    }

    const REACT_DOC: &str = "Intro.\n\n```jsx codesandbox=react\nrender(<App />);\n```\n";

    #[test]
    fn test_document_without_directive_is_unchanged() {
        let api = api();
        let md = "# Title\n\n```js\nconsole.log(1);\n```\n\n```js title=x\ny\n```\n";
        let mut doc = Document::parse(md);

        let report = transformer(&api, Mode::Iframe)
            .transform(&mut doc, None)
            .unwrap();

        assert!(report.is_empty());
        assert_eq!(report.title.as_deref(), Some("Title"));
        assert_eq!(doc.to_markdown(), md);
        assert!(api.fetches().is_empty());
        assert!(api.defines().is_empty());
    }

    #[test]
    fn test_meta_mode_annotates_code_node() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        let report = transformer(&api, Mode::Meta)
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(doc.children(doc.root()).len(), 2);
        let code = doc.children(doc.root())[1];
        let url = "https://codesandbox.io/s/sandbox1?module=%2Fsrc%2Findex.js";
        assert_eq!(doc.data(code).fields["codesandboxUrl"], url);
        assert_eq!(doc.data(code).h_properties["data-codesandbox-url"], url);
        assert_eq!(doc.data(code).h_properties["data-codesandbox-title"], "React");
        assert_eq!(doc.to_markdown(), REACT_DOC);
        assert_eq!(
            report.sandboxes,
            vec![CreatedSandbox {
                template_id: "react".to_owned(),
                url: url.to_owned(),
                sandbox_id: Some("sandbox1".to_owned()),
            }]
        );
    }

    #[test]
    fn test_meta_mode_is_idempotent() {
        let api = api();
        let transformer =
            SandboxTransformer::new(Arc::clone(&api) as Arc<dyn SandboxApi>).working_dir("/work");
        let mut doc = Document::parse(REACT_DOC);

        transformer.transform(&mut doc, None).unwrap();
        let code = doc.children(doc.root())[1];
        let first = doc.data(code).clone();
        transformer.transform(&mut doc, None).unwrap();

        assert_eq!(doc.data(code), &first);
        assert_eq!(doc.children(doc.root()).len(), 2);
        assert!(
            first.fields["codesandboxUrl"]
                .starts_with("https://codesandbox.io/api/v1/sandboxes/define?parameters=")
        );
    }

    #[test]
    fn test_button_mode_inserts_badge_after_code() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        transformer(&api, Mode::Button)
            .transform(&mut doc, None)
            .unwrap();

        let root = doc.root();
        assert_eq!(doc.children(root).len(), 3);
        assert!(doc.kind(doc.children(root)[1]).is_code());
        let paragraph = doc.children(root)[2];
        assert_eq!(doc.kind(paragraph), &NodeKind::Paragraph);
        let link = doc.children(paragraph)[0];
        assert_eq!(
            doc.kind(link),
            &NodeKind::Link {
                url: "https://codesandbox.io/s/sandbox1?module=%2Fsrc%2Findex.js".to_owned(),
                title: String::new(),
            }
        );
        let image = doc.children(link)[0];
        assert_eq!(
            doc.kind(image),
            &NodeKind::Image {
                url: "https://codesandbox.io/static/img/play-codesandbox.svg".to_owned(),
                alt: "Edit on CodeSandbox".to_owned(),
                title: String::new(),
            }
        );
        assert_eq!(
            doc.to_markdown(),
            "Intro.\n\n```jsx codesandbox=react\nrender(<App />);\n```\n\n\
             [![Edit on CodeSandbox](https://codesandbox.io/static/img/play-codesandbox.svg)]\
             (https://codesandbox.io/s/sandbox1?module=%2Fsrc%2Findex.js)\n"
        );
    }

    #[test]
    fn test_iframe_mode_replaces_code_block() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        transformer(&api, Mode::Iframe)
            .transform(&mut doc, None)
            .unwrap();

        let root = doc.children(doc.root()).to_vec();
        assert_eq!(root.len(), 2);
        assert_eq!(
            doc.kind(root[1]),
            &NodeKind::Html {
                value: "<iframe\n  \
                    src=\"https://codesandbox.io/embed/sandbox1?fontsize=14px&hidenavigation=1&theme=dark&module=%2Fsrc%2Findex.js\"\n  \
                    style=\"width:100%; height:500px; border:0; border-radius: 4px; overflow:hidden;\"\n  \
                    title=\"React\"\n  \
                    allow=\"geolocation; microphone; camera; midi; vr; accelerometer; gyroscope; payment; ambient-light-sensor; encrypted-media; usb\"\n  \
                    sandbox=\"allow-modals allow-forms allow-popups allow-scripts allow-same-origin\"\n\
                    ></iframe>"
                    .to_owned(),
            }
        );
    }

    #[test]
    fn test_iframe_block_query_overrides_defaults() {
        let api = api();
        let mut doc = Document::parse(
            "```js codesandbox=new?fontsize=13&hidenavigation=0&module=/src/App.js\nx\n```\n",
        );

        let report = transformer(&api, Mode::Iframe)
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(
            report.sandboxes[0].url,
            "https://codesandbox.io/s/sandbox1?fontsize=13&hidenavigation=0&theme=dark&module=%2Fsrc%2FApp.js"
        );
    }

    #[test]
    fn test_configured_query_replaces_mode_default() {
        let api = api();
        let mut doc = Document::parse("```js codesandbox=new?fontsize=13\nx\n```\n");

        let report = transformer(&api, Mode::Iframe)
            .query(QuerySource::Map(vec![
                ("fontsize".to_owned(), "12".to_owned()),
                ("hidenavigation".to_owned(), "0".to_owned()),
            ]))
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(
            report.sandboxes[0].url,
            "https://codesandbox.io/s/sandbox1?fontsize=13&hidenavigation=0&module=%2Fsrc%2Findex.js"
        );
    }

    #[test]
    fn test_configured_query_applies_in_button_mode() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        let report = transformer(&api, Mode::Button)
            .query("view=preview")
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(
            report.sandboxes[0].url,
            "https://codesandbox.io/s/sandbox1?view=preview&module=%2Fsrc%2Findex.js"
        );
    }

    #[test]
    fn test_block_source_replaces_entry_file() {
        let api = api();
        let mut doc = Document::parse("```jsx codesandbox=react-component\nexport default 1;\n```\n");

        let report = transformer(&api, Mode::Meta)
            .transform(&mut doc, None)
            .unwrap();

        let expected: BTreeMap<String, String> = [
            ("package.json", "{\"main\": \"src/index.js\"}"),
            ("src/App.js", "export default 1;"),
            ("src/index.js", "base"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(api.defines(), vec![define_parameters(&expected).unwrap()]);
        assert_eq!(
            report.sandboxes[0].url,
            "https://codesandbox.io/s/sandbox1?module=%2Fsrc%2FApp.js"
        );
    }

    #[test]
    fn test_override_entry_lines_and_stripped_from_query() {
        let api = api();
        let mut doc = Document::parse(
            "```jsx codesandbox=react-component?overrideEntry=2-2\nreplaced\n```\n",
        );

        let report = transformer(&api, Mode::Meta)
            .transform(&mut doc, None)
            .unwrap();

        let expected: BTreeMap<String, String> = [
            ("package.json", "{\"main\": \"src/index.js\"}"),
            ("src/App.js", "line1\nreplaced\nline3"),
            ("src/index.js", "base"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(api.defines(), vec![define_parameters(&expected).unwrap()]);
        assert!(!report.sandboxes[0].url.contains("overrideEntry"));
    }

    #[test]
    fn test_override_entry_false_keeps_template() {
        let api = api();
        let mut doc = Document::parse("```jsx codesandbox=new?overrideEntry=false\nignored\n```\n");

        transformer(&api, Mode::Meta)
            .transform(&mut doc, None)
            .unwrap();

        let expected: BTreeMap<String, String> = [
            ("package.json", "{\"main\": \"src/index.js\"}"),
            ("src/App.js", "line1\nline2\nline3"),
            ("src/index.js", "base"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(api.defines(), vec![define_parameters(&expected).unwrap()]);
    }

    #[test]
    fn test_deferred_define_url() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        let report = SandboxTransformer::new(Arc::clone(&api) as Arc<dyn SandboxApi>)
            .mode(Mode::Button)
            .transform(&mut doc, None)
            .unwrap();

        let url = &report.sandboxes[0].url;
        assert!(url.starts_with("https://codesandbox.io/api/v1/sandboxes/define?parameters="));
        assert!(url.ends_with("&query=module%3D%252Fsrc%252Findex.js"));
        assert_eq!(report.sandboxes[0].sandbox_id, None);
        assert!(api.defines().is_empty());
    }

    #[test]
    fn test_deferred_iframe_url_embeds() {
        let api = api();
        let mut doc = Document::parse(REACT_DOC);

        SandboxTransformer::new(Arc::clone(&api) as Arc<dyn SandboxApi>)
            .mode(Mode::Iframe)
            .transform(&mut doc, None)
            .unwrap();

        let html = doc.children(doc.root())[1];
        let NodeKind::Html { value } = doc.kind(html) else {
            panic!("expected html node");
        };
        assert!(value.contains("src=\"https://codesandbox.io/api/v1/sandboxes/define?embed=1&parameters="));
    }

    #[test]
    fn test_template_fetched_once_per_run() {
        let api = api();
        let mut doc = Document::parse(
            "```js codesandbox=new\na\n```\n\n```js codesandbox=react\nb\n```\n\n\
             ```js codesandbox=react-component\nc\n```\n",
        );

        let report = transformer(&api, Mode::Button)
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(report.sandboxes.len(), 3);
        assert_eq!(api.fetch_count("new"), 1);
        assert_eq!(doc.children(doc.root()).len(), 6);
    }

    #[test]
    fn test_shared_cache_across_documents() {
        let api = api();
        let transformer = transformer(&api, Mode::Meta);
        let mut cache = TemplateCache::new();

        for _ in 0..3 {
            let mut doc = Document::parse(REACT_DOC);
            transformer
                .transform_with_cache(&mut doc, None, &mut cache)
                .unwrap();
        }

        assert_eq!(api.fetch_count("new"), 1);
        assert_eq!(api.defines().len(), 3);
    }

    #[test]
    fn test_document_heading_is_title() {
        let api = api();
        let mut doc = Document::parse("# My *Demo*\n\n## Sub\n\n```js codesandbox=new\nx\n```\n");

        let report = transformer(&api, Mode::Iframe)
            .transform(&mut doc, None)
            .unwrap();

        assert_eq!(report.title.as_deref(), Some("My Demo"));
        let html = doc.children(doc.root())[2];
        let NodeKind::Html { value } = doc.kind(html) else {
            panic!("expected html node");
        };
        assert!(value.contains("title=\"My Demo\""));
    }

    #[test]
    fn test_custom_title_beats_heading() {
        let api = api();
        let mut doc = Document::parse("# Heading\n\n```js codesandbox=titled\nx\n```\n");
        let templates = CustomTemplates::with_overrides([(
            "titled".to_owned(),
            CustomTemplate::extending("new").with_title("Custom \"quoted\""),
        )]);

        transformer(&api, Mode::Iframe)
            .custom_templates(templates)
            .transform(&mut doc, None)
            .unwrap();

        let html = doc.children(doc.root())[1];
        let NodeKind::Html { value } = doc.kind(html) else {
            panic!("expected html node");
        };
        assert!(value.contains("title=\"Custom &quot;quoted&quot;\""));
    }

    #[test]
    fn test_iframe_style_overrides() {
        let api = api();
        let mut doc = Document::parse("```js codesandbox=new style=height:300px\nx\n```\n");

        transformer(&api, Mode::Iframe)
            .style("border-radius: 0; width: 80%")
            .transform(&mut doc, None)
            .unwrap();

        let html = doc.children(doc.root())[0];
        let NodeKind::Html { value } = doc.kind(html) else {
            panic!("expected html node");
        };
        assert!(value.contains(
            "style=\"width:80%; height:300px; border:0; border-radius:0; overflow:hidden;\""
        ));
    }

    #[test]
    fn test_nested_code_block_in_list() {
        let api = api();
        let mut doc = Document::parse("- item\n\n  ```js codesandbox=new\n  x\n  ```\n");

        transformer(&api, Mode::Button)
            .transform(&mut doc, None)
            .unwrap();

        let list = doc.children(doc.root())[0];
        let item = doc.children(list)[0];
        let kinds: Vec<_> = doc.children(item).iter().map(|&c| doc.kind(c)).collect();
        assert_eq!(kinds.len(), 3);
        assert!(kinds[1].is_code());
        assert_eq!(kinds[2], &NodeKind::Paragraph);
    }

    #[test]
    fn test_directive_without_template_is_skipped() {
        let api = api();
        let md = "```js codesandbox=?module=/a.js\nx\n```\n";
        let mut doc = Document::parse(md);

        let report = transformer(&api, Mode::Button)
            .transform(&mut doc, None)
            .unwrap();

        assert!(report.is_empty());
        assert_eq!(doc.to_markdown(), md);
    }

    #[test]
    fn test_fetch_failure_aborts_run() {
        let api = Arc::new(MockSandboxApi::new());
        let mut doc = Document::parse("```js codesandbox=missing\nx\n```\n\n```js codesandbox=other\ny\n```\n");

        let err = transformer(&api, Mode::Button)
            .transform(&mut doc, None)
            .unwrap_err();

        assert!(matches!(err, SandboxError::TemplateFetch { .. }));
        assert_eq!(api.fetches(), vec!["missing"]);
        assert_eq!(doc.children(doc.root()).len(), 2);
    }

    #[test]
    fn test_create_failure() {
        let api = Arc::new(
            MockSandboxApi::new()
                .with_template("new", "src/index.js", &[])
                .with_failing_define(),
        );
        let mut doc = Document::parse(REACT_DOC);

        let err = transformer(&api, Mode::Meta)
            .transform(&mut doc, None)
            .unwrap_err();

        assert!(matches!(
            err,
            SandboxError::SandboxCreate { ref template_id, .. } if template_id == "react"
        ));
    }

    #[test]
    fn test_local_template_relative_to_document() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("demo");
        fs::create_dir_all(template.join("src")).unwrap();
        fs::write(template.join("package.json"), r#"{"dependencies": {"react-scripts": "5"}}"#).unwrap();
        fs::write(template.join("src/index.js"), "template").unwrap();
        let doc_path = temp.path().join("README.md");

        let api = Arc::new(MockSandboxApi::new());
        let mut doc = Document::parse("```js codesandbox=file:./demo\nx\n```\n");

        transformer(&api, Mode::Iframe)
            .transform(&mut doc, Some(doc_path.as_path()))
            .unwrap();

        assert!(api.fetches().is_empty());
        let html = doc.children(doc.root())[0];
        let NodeKind::Html { value } = doc.kind(html) else {
            panic!("expected html node");
        };
        assert!(value.contains("title=\"demo\""));
    }

    #[test]
    fn test_relative_local_templates_per_document_with_shared_cache() {
        let temp = TempDir::new().unwrap();
        let mut docs = Vec::new();
        for name in ["a", "b"] {
            let template = temp.path().join(name).join("demo");
            fs::create_dir_all(template.join("src")).unwrap();
            fs::write(template.join("package.json"), "{}").unwrap();
            fs::write(template.join("src/index.js"), "").unwrap();
            fs::write(template.join("src/data.js"), format!("export default '{name}';")).unwrap();
            docs.push(temp.path().join(name).join("README.md"));
        }

        let api = Arc::new(MockSandboxApi::new());
        let transformer = transformer(&api, Mode::Meta);
        let mut cache = TemplateCache::new();
        for path in &docs {
            let mut doc = Document::parse("```js codesandbox=file:./demo\nx\n```\n");
            transformer
                .transform_with_cache(&mut doc, Some(path.as_path()), &mut cache)
                .unwrap();
        }

        let defines = api.defines();
        assert_eq!(defines.len(), 2);
        assert_ne!(defines[0], defines[1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_local_templates_disabled() {
        let api = Arc::new(MockSandboxApi::new());
        let mut doc = Document::parse("```js codesandbox=file:/tmp/demo\nx\n```\n");

        let err = transformer(&api, Mode::Meta)
            .local_reader(None)
            .transform(&mut doc, None)
            .unwrap_err();

        assert!(matches!(err, SandboxError::UnsupportedEnvironment { .. }));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("meta".parse::<Mode>().unwrap(), Mode::Meta);
        assert_eq!("button".parse::<Mode>().unwrap(), Mode::Button);
        assert_eq!("iframe".parse::<Mode>().unwrap(), Mode::Iframe);
        assert!("embed".parse::<Mode>().is_err());
        assert_eq!(Mode::Iframe.to_string(), "iframe");
    }

    #[test]
    fn test_mode_default_query() {
        assert_eq!(
            Mode::Iframe.default_query().to_query_string(),
            "fontsize=14px&hidenavigation=1&theme=dark"
        );
        assert!(Mode::Meta.default_query().is_empty());
        assert!(Mode::Button.default_query().is_empty());
    }
}

//! Template resolution.
//!
//! A template id is resolved in this order:
//! 1. the run's [`TemplateCache`]
//! 2. the custom template table (resolving `extends` first)
//! 3. a `file:<path>` local directory
//! 4. a sandbox fetched from the hosting service
//!
//! Every resolved id is cached, so each template is read or fetched at most
//! once per run, whether it is used directly or as a base.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::api::{DirectoryRecord, ModuleRecord, SandboxApi, SandboxData};
use crate::consts::FILE_TEMPLATE_PREFIX;
use crate::error::SandboxError;
use crate::local::LocalTemplateReader;
use crate::template::{CustomTemplates, Template, default_entry, to_base_path};

/// Resolved templates of one run, by id.
///
/// Entries are written once and never evicted.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: HashMap<String, Template>,
}

impl TemplateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where an id being resolved was referenced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// Written in a code block.
    Document,
    /// Named as the base of a custom template.
    Custom,
}

/// Resolves template ids against custom templates, local directories and
/// the hosting service.
pub struct TemplateResolver<'a> {
    api: &'a dyn SandboxApi,
    custom_templates: &'a CustomTemplates,
    local: Option<&'a dyn LocalTemplateReader>,
    working_dir: &'a Path,
    document_dir: Option<&'a Path>,
}

impl<'a> TemplateResolver<'a> {
    #[must_use]
    pub fn new(
        api: &'a dyn SandboxApi,
        custom_templates: &'a CustomTemplates,
        working_dir: &'a Path,
    ) -> Self {
        Self {
            api,
            custom_templates,
            local: None,
            working_dir,
            document_dir: None,
        }
    }

    /// Enable `file:` templates.
    #[must_use]
    pub fn with_local_reader(mut self, reader: Option<&'a dyn LocalTemplateReader>) -> Self {
        self.local = reader;
        self
    }

    /// Directory that relative `file:` ids in a document resolve against.
    #[must_use]
    pub fn with_document_dir(mut self, dir: Option<&'a Path>) -> Self {
        self.document_dir = dir;
        self
    }

    /// Resolve `id`, filling `cache` with it and any base templates.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::TemplateFetch`] if a remote template cannot be
    /// fetched, [`SandboxError::CircularTemplate`] for an inheritance loop,
    /// and the local reader's errors for `file:` templates.
    pub fn resolve<'c>(
        &self,
        cache: &'c mut TemplateCache,
        id: &str,
    ) -> Result<&'c Template, SandboxError> {
        let mut chain = Vec::new();
        self.resolve_inner(cache, id, &mut chain, Origin::Document)
    }

    fn resolve_inner<'c>(
        &self,
        cache: &'c mut TemplateCache,
        id: &str,
        chain: &mut Vec<String>,
        origin: Origin,
    ) -> Result<&'c Template, SandboxError> {
        let key = self.cache_key(id, origin);
        if cache.entries.contains_key(&key) {
            tracing::debug!(template = id, key = %key, "Template cache hit");
            return Ok(&cache.entries[&key]);
        }
        if chain.iter().any(|c| c == id) {
            let mut names = chain.clone();
            names.push(id.to_owned());
            return Err(SandboxError::CircularTemplate {
                chain: names.join(" -> "),
            });
        }

        let template = if let Some(custom) = self.custom_templates.get(id) {
            chain.push(id.to_owned());
            let base = self.resolve_inner(cache, &custom.extends, chain, Origin::Custom)?;
            let template = Template::extend(base, id, custom);
            chain.pop();
            template
        } else {
            self.load_base(id, chain.first().map(String::as_str), origin)?
        };

        Ok(cache.entries.entry(key).or_insert(template))
    }

    /// Cache key for `id`.
    ///
    /// Relative `file:` ids are keyed by the directory they resolve to, so
    /// documents in different directories sharing a cache get their own
    /// template.
    fn cache_key(&self, id: &str, origin: Origin) -> String {
        let Some(path) = id.strip_prefix(FILE_TEMPLATE_PREFIX) else {
            return id.to_owned();
        };
        match self.local_dir(id, Path::new(path), origin) {
            Ok(dir) => format!("{FILE_TEMPLATE_PREFIX}{}", dir.display()),
            Err(_) => id.to_owned(),
        }
    }

    fn load_base(
        &self,
        id: &str,
        via: Option<&str>,
        origin: Origin,
    ) -> Result<Template, SandboxError> {
        if let Some(path) = id.strip_prefix(FILE_TEMPLATE_PREFIX) {
            return self.load_local(id, path, origin);
        }

        tracing::info!(template = id, via = ?via, "Fetching sandbox template");
        let data = self.api.fetch_sandbox(id).map_err(|source| {
            tracing::error!(template = id, via = ?via, error = %source, "Failed to get the sandbox template");
            SandboxError::TemplateFetch {
                template_id: id.to_owned(),
                source,
            }
        })?;
        Ok(template_from_sandbox(id, data))
    }

    fn load_local(&self, id: &str, path: &str, origin: Origin) -> Result<Template, SandboxError> {
        let reader = self.local.ok_or_else(|| SandboxError::UnsupportedEnvironment {
            template_id: id.to_owned(),
            reason: "local file templates are not available",
        })?;

        let dir = self.local_dir(id, Path::new(path), origin)?;
        tracing::info!(template = id, dir = %dir.display(), "Reading local template");
        let local = reader.read(&dir)?;

        Ok(Template::new(id, local.files, &local.entry).with_title(local.title))
    }

    /// Custom templates resolve relative paths against the working
    /// directory, documents against their own directory.
    fn local_dir(&self, id: &str, path: &Path, origin: Origin) -> Result<PathBuf, SandboxError> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        match origin {
            Origin::Custom => Ok(self.working_dir.join(path)),
            Origin::Document => self.document_dir.map(|dir| dir.join(path)).ok_or_else(|| {
                SandboxError::UnsupportedEnvironment {
                    template_id: id.to_owned(),
                    reason: "relative paths need the document's location",
                }
            }),
        }
    }
}

/// Build a template from a fetched sandbox listing.
fn template_from_sandbox(id: &str, data: SandboxData) -> Template {
    let files = flatten_modules(&data.directories, &data.modules);
    let entry = data
        .entry
        .as_deref()
        .map(to_base_path)
        .filter(|e| !e.is_empty())
        .map_or_else(default_entry, str::to_owned);

    let mut template = Template::new(id, files, &entry);
    template.title = data.title.filter(|t| !t.is_empty());
    template
}

/// Turn a directory/module listing into relative file paths.
///
/// Each module's path is its parent directory chain joined with `/`.
fn flatten_modules(
    directories: &[DirectoryRecord],
    modules: &[ModuleRecord],
) -> BTreeMap<String, String> {
    let by_id: HashMap<&str, &DirectoryRecord> = directories
        .iter()
        .map(|d| (d.shortid.as_str(), d))
        .collect();

    modules
        .iter()
        .map(|module| {
            let mut segments = vec![module.title.as_str()];
            let mut seen = HashSet::new();
            let mut parent = module.directory_shortid.as_deref();
            while let Some(shortid) = parent {
                let Some(dir) = by_id.get(shortid) else {
                    break;
                };
                if !seen.insert(shortid) {
                    break;
                }
                segments.push(dir.title.as_str());
                parent = dir.directory_shortid.as_deref();
            }

            let path = segments
                .iter()
                .rev()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("/");
            (path, module.code.clone())
        })
        .collect()
}

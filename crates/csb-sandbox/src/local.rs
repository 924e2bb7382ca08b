//! Local directory templates.
//!
//! A `file:<path>` template id points at a project directory on disk. The
//! directory is read recursively (housekeeping files excluded) and must
//! contain a `package.json`, from which the template kind and its entry file
//! are inferred.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::Pattern;
use serde_json::Value;

use crate::consts::{EXCLUDED_PATTERNS, MANIFEST_FILE, SANDBOX_CONFIG_FILE};
use crate::error::SandboxError;

/// Files and metadata read from a template directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTemplate {
    /// Relative path (with `/` separators) to content.
    pub files: BTreeMap<String, String>,
    pub entry: String,
    /// Directory base name.
    pub title: String,
    /// Inferred template kind, e.g. `create-react-app`.
    pub kind: String,
}

/// Reads template directories.
///
/// The transformer has no reader unless one is configured, in which case
/// `file:` templates fail with [`SandboxError::UnsupportedEnvironment`].
pub trait LocalTemplateReader {
    /// Read the template rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::LocalRead`] if the directory cannot be read,
    /// [`SandboxError::MissingManifest`] without a `package.json` and
    /// [`SandboxError::InvalidManifest`] if it is not valid JSON.
    fn read(&self, dir: &Path) -> Result<LocalTemplate, SandboxError>;
}

/// Filesystem-backed [`LocalTemplateReader`].
#[derive(Debug, Clone)]
pub struct FsTemplateReader {
    excluded: Vec<Pattern>,
}

impl FsTemplateReader {
    /// Reader with the default exclusions (`.git`, `node_modules`, lock files, logs).
    #[must_use]
    pub fn new() -> Self {
        Self {
            excluded: compile_patterns(EXCLUDED_PATTERNS),
        }
    }

    /// Add exclusion patterns, matched against each path component.
    #[must_use]
    pub fn with_excluded(mut self, patterns: &[&str]) -> Self {
        self.excluded.extend(compile_patterns(patterns));
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|p| p.matches(name))
    }

    fn read_directory(
        &self,
        dir: &Path,
        prefix: &str,
        files: &mut BTreeMap<String, String>,
    ) -> Result<(), SandboxError> {
        let local_read = |source: std::io::Error| SandboxError::LocalRead {
            path: dir.to_path_buf(),
            source,
        };

        for entry in fs::read_dir(dir).map_err(local_read)? {
            let entry = entry.map_err(local_read)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_excluded(&name) {
                continue;
            }

            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let path = entry.path();

            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                self.read_directory(&path, &relative, files)?;
                continue;
            }

            let bytes = fs::read(&path).map_err(|source| SandboxError::LocalRead {
                path: path.clone(),
                source,
            })?;
            match String::from_utf8(bytes) {
                Ok(content) => {
                    files.insert(relative, content);
                }
                Err(_) => {
                    tracing::debug!(path = %path.display(), "Skipping binary template file");
                }
            }
        }
        Ok(())
    }
}

impl Default for FsTemplateReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTemplateReader for FsTemplateReader {
    fn read(&self, dir: &Path) -> Result<LocalTemplate, SandboxError> {
        let mut files = BTreeMap::new();
        self.read_directory(dir, "", &mut files)?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = files
            .get(MANIFEST_FILE)
            .ok_or_else(|| SandboxError::MissingManifest {
                path: dir.to_path_buf(),
                manifest: MANIFEST_FILE,
            })?;
        let manifest: Value = serde_json::from_str(manifest).map_err(|source| {
            SandboxError::InvalidManifest {
                path: manifest_path,
                source,
            }
        })?;

        let kind = configured_kind(&files).unwrap_or_else(|| infer_kind(&manifest).to_owned());
        let entry = entry_for(&kind, &manifest, &files);
        let title = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(
            dir = %dir.display(),
            kind = %kind,
            files = files.len(),
            "Read local template"
        );

        Ok(LocalTemplate {
            files,
            entry,
            title,
            kind,
        })
    }
}

fn compile_patterns(patterns: &[&str]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "Ignoring invalid exclusion pattern");
                None
            }
        })
        .collect()
}

/// Template kind pinned by `sandbox.config.json`.
fn configured_kind(files: &BTreeMap<String, String>) -> Option<String> {
    let config: Value = serde_json::from_str(files.get(SANDBOX_CONFIG_FILE)?).ok()?;
    config
        .get("template")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Dependency name to template kind, checked in order.
const KIND_BY_DEPENDENCY: &[(&str, &str)] = &[
    ("nuxt", "nuxt"),
    ("next", "next"),
    ("apollo-server", "apollo"),
    ("mdx-deck", "mdx-deck"),
    ("gatsby", "gatsby"),
    ("gridsome", "gridsome"),
    ("vuepress", "vuepress"),
    ("ember-cli", "ember"),
    ("sapper", "sapper"),
    ("@nestjs/core", "nest"),
    ("@quasar/app", "quasar"),
    ("react-styleguidist", "styleguidist"),
    ("react-scripts-ts", "create-react-app-typescript"),
    ("react-scripts", "create-react-app"),
    ("@angular/core", "angular-cli"),
    ("preact-cli", "preact-cli"),
    ("svelte", "svelte"),
    ("@vue/cli-service", "vue-cli"),
    ("vue", "vue-cli"),
    ("parcel-bundler", "parcel"),
    ("@dojo/framework", "@dojo/cli-create-app"),
    ("cx", "cxjs"),
    ("reason-react", "reason"),
];

/// Infer the template kind from manifest dependencies.
fn infer_kind(manifest: &Value) -> &'static str {
    let has_dependency = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| manifest.get(section).and_then(|d| d.get(name)).is_some())
    };

    KIND_BY_DEPENDENCY
        .iter()
        .find(|(dependency, _)| has_dependency(dependency))
        .map_or("node", |&(_, kind)| kind)
}

/// Default entry file of a template kind.
fn default_entry(kind: &str) -> Option<&'static str> {
    let entry = match kind {
        "create-react-app" | "reason" => "src/index.js",
        "create-react-app-typescript" => "src/index.tsx",
        "angular-cli" | "@dojo/cli-create-app" => "src/main.ts",
        "vue-cli" | "svelte" => "src/main.js",
        "parcel" | "static" => "index.html",
        "preact-cli" => "index.js",
        "gatsby" => "src/pages/index.js",
        "gridsome" | "quasar" => "src/pages/Index.vue",
        "mdx-deck" => "deck.mdx",
        "cxjs" => "app/index.js",
        "ember" => "app/app.js",
        "nuxt" | "next" | "apollo" | "nest" | "vuepress" | "styleguidist" | "sapper" => {
            "package.json"
        }
        _ => return None,
    };
    Some(entry)
}

/// Pick the entry file: the kind's default, or the manifest `main` for
/// plain node projects.
fn entry_for(kind: &str, manifest: &Value, files: &BTreeMap<String, String>) -> String {
    if let Some(entry) = default_entry(kind) {
        return entry.to_owned();
    }
    manifest
        .get("main")
        .and_then(Value::as_str)
        .map(crate::template::to_base_path)
        .filter(|main| files.contains_key(*main))
        .map_or_else(crate::template::default_entry, str::to_owned)
}

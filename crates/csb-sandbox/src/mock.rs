//! Mock sandbox API for testing.
//!
//! Provides [`MockSandboxApi`] for unit testing without network access.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::api::{DirectoryRecord, ModuleRecord, SandboxApi, SandboxData};
use crate::error::ApiError;

/// In-memory sandbox service that records every call.
///
/// # Example
///
/// ```ignore
/// use csb_sandbox::{MockSandboxApi, SandboxApi};
///
/// let api = MockSandboxApi::new()
///     .with_template("new", "src/index.js", &[("package.json", "{}")]);
///
/// let data = api.fetch_sandbox("new").unwrap();
/// assert_eq!(api.fetch_count("new"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockSandboxApi {
    sandboxes: RwLock<HashMap<String, SandboxData>>,
    fetches: RwLock<Vec<String>>,
    defines: RwLock<Vec<String>>,
    fail_define: RwLock<bool>,
}

impl MockSandboxApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sandbox listing under `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_sandbox(self, id: impl Into<String>, data: SandboxData) -> Self {
        self.sandboxes.write().unwrap().insert(id.into(), data);
        self
    }

    /// Register a sandbox built from flat `(path, content)` pairs.
    ///
    /// Nested paths become directory records, so fetching exercises the
    /// same listing normalization as the real service.
    #[must_use]
    pub fn with_template(self, id: &str, entry: &str, files: &[(&str, &str)]) -> Self {
        let data = listing(entry, files);
        self.with_sandbox(id, data)
    }

    /// Set the title of a registered sandbox.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_title(self, id: &str, title: impl Into<String>) -> Self {
        if let Some(data) = self.sandboxes.write().unwrap().get_mut(id) {
            data.title = Some(title.into());
        }
        self
    }

    /// Make every define call fail with a server error.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failing_define(self) -> Self {
        *self.fail_define.write().unwrap() = true;
        self
    }

    /// Number of fetches for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches
            .read()
            .unwrap()
            .iter()
            .filter(|f| *f == id)
            .count()
    }

    /// All fetched ids in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.read().unwrap().clone()
    }

    /// Parameters of all define calls in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn defines(&self) -> Vec<String> {
        self.defines.read().unwrap().clone()
    }
}

impl SandboxApi for MockSandboxApi {
    fn fetch_sandbox(&self, id: &str) -> Result<SandboxData, ApiError> {
        self.fetches.write().unwrap().push(id.to_owned());
        self.sandboxes
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::HttpResponse {
                status: 404,
                body: "Not Found".to_owned(),
            })
    }

    fn define_sandbox(&self, parameters: &str) -> Result<String, ApiError> {
        if *self.fail_define.read().unwrap() {
            return Err(ApiError::HttpResponse {
                status: 500,
                body: "Internal Server Error".to_owned(),
            });
        }
        let mut defines = self.defines.write().unwrap();
        defines.push(parameters.to_owned());
        Ok(format!("sandbox{}", defines.len()))
    }
}

/// Build a service-style listing from flat paths.
fn listing(entry: &str, files: &[(&str, &str)]) -> SandboxData {
    let mut directories: Vec<DirectoryRecord> = Vec::new();
    let mut modules = Vec::new();

    for (index, (path, content)) in files.iter().enumerate() {
        let mut parent: Option<String> = None;
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(title) = segments.pop() else {
            continue;
        };

        for segment in segments {
            let existing = directories
                .iter()
                .find(|d| d.title == segment && d.directory_shortid == parent)
                .map(|d| d.shortid.clone());
            let shortid = existing.unwrap_or_else(|| {
                let shortid = format!("dir{}", directories.len());
                directories.push(DirectoryRecord {
                    shortid: shortid.clone(),
                    directory_shortid: parent.clone(),
                    title: segment.to_owned(),
                });
                shortid
            });
            parent = Some(shortid);
        }

        modules.push(ModuleRecord {
            shortid: format!("mod{index}"),
            directory_shortid: parent,
            title: title.to_owned(),
            code: (*content).to_owned(),
        });
    }

    SandboxData {
        id: None,
        title: None,
        entry: Some(entry.to_owned()),
        directories,
        modules,
    }
}

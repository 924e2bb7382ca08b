//! Templates and custom template definitions.

use std::collections::{BTreeMap, HashMap};

use crate::consts::DEFAULT_ENTRY;

/// Normalize a template-relative path.
///
/// Leading `./` and `/` are stripped, so `./src/index.js`, `/src/index.js`
/// and `src/index.js` are the same path.
#[must_use]
pub fn to_base_path(path: &str) -> &str {
    let mut path = path;
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            return path;
        }
    }
}

fn normalize_files(files: &BTreeMap<String, String>) -> impl Iterator<Item = (String, String)> {
    files
        .iter()
        .map(|(path, content)| (to_base_path(path).to_owned(), content.clone()))
}

/// How a code block's source is written into the template entry file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryOverride {
    /// The block source replaces the whole entry file.
    #[default]
    Replace,
    /// The entry file is left as the template provides it.
    Keep,
    /// The block source replaces lines `start..=end` (1-based).
    Lines { start: usize, end: usize },
}

impl EntryOverride {
    /// Parse an `overrideEntry` query value: `true`, `false`, `N` or `N-M`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "true" => Some(Self::Replace),
            "false" => Some(Self::Keep),
            range => {
                let (start, end) = range.split_once('-').unwrap_or((range, range));
                let start = start.trim().parse::<usize>().ok()?;
                let end = end.trim().parse::<usize>().ok()?;
                (start >= 1 && end >= start).then_some(Self::Lines { start, end })
            }
        }
    }
}

/// A resolved template: base files plus the entry path block source goes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    /// Normalized relative path to file content.
    pub files: BTreeMap<String, String>,
    /// Normalized entry path.
    pub entry: String,
    /// Title fetched from the service or derived from a directory name.
    pub title: Option<String>,
    /// Title set by a custom template; wins over the document heading.
    pub title_override: Option<String>,
    pub extends: Option<String>,
}

impl Template {
    /// Create a template with normalized paths.
    #[must_use]
    pub fn new(id: impl Into<String>, files: BTreeMap<String, String>, entry: &str) -> Self {
        Self {
            id: id.into(),
            files: normalize_files(&files).collect(),
            entry: to_base_path(entry).to_owned(),
            title: None,
            title_override: None,
            extends: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Overlay a custom template onto its resolved base.
    #[must_use]
    pub fn extend(base: &Self, id: &str, custom: &CustomTemplate) -> Self {
        let mut files = base.files.clone();
        files.extend(normalize_files(&custom.files));

        Self {
            id: id.to_owned(),
            files,
            entry: custom
                .entry
                .as_deref()
                .map_or_else(|| base.entry.clone(), |e| to_base_path(e).to_owned()),
            title: base.title.clone(),
            title_override: custom.title.clone().or_else(|| base.title_override.clone()),
            extends: Some(custom.extends.clone()),
        }
    }

    /// Title shown for a sandbox built from this template.
    ///
    /// Custom title first, then the document heading, then the template's
    /// own title.
    #[must_use]
    pub fn display_title<'a>(&'a self, document_title: Option<&'a str>) -> &'a str {
        self.title_override
            .as_deref()
            .or(document_title)
            .or(self.title.as_deref())
            .unwrap_or_default()
    }

    /// Value of the `module` query parameter: the entry with a leading `/`.
    #[must_use]
    pub fn module_path(&self) -> String {
        format!("/{}", self.entry)
    }

    /// File set for one code block. The template itself is left unchanged.
    #[must_use]
    pub fn files_with_entry(&self, source: &str, mode: EntryOverride) -> BTreeMap<String, String> {
        let mut files = self.files.clone();
        match mode {
            EntryOverride::Replace => {
                files.insert(self.entry.clone(), source.to_owned());
            }
            EntryOverride::Keep => {}
            EntryOverride::Lines { start, end } => {
                let current = files.get(&self.entry).map_or("", String::as_str);
                let spliced = splice_lines(current, start, end, source);
                files.insert(self.entry.clone(), spliced);
            }
        }
        files
    }
}

/// Replace lines `start..=end` (1-based) of `content` with `replacement`.
fn splice_lines(content: &str, start: usize, end: usize, replacement: &str) -> String {
    let lines: Vec<&str> = if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    };
    let from = start.saturating_sub(1).min(lines.len());
    let to = end.min(lines.len()).max(from);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..from]);
    out.extend(replacement.split('\n'));
    out.extend_from_slice(&lines[to..]);
    out.join("\n")
}

/// A named template defined by inheritance from another one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomTemplate {
    pub extends: String,
    pub entry: Option<String>,
    pub files: BTreeMap<String, String>,
    pub title: Option<String>,
}

impl CustomTemplate {
    #[must_use]
    pub fn extending(extends: impl Into<String>) -> Self {
        Self {
            extends: extends.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

/// Table of custom templates by identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomTemplates {
    entries: HashMap<String, CustomTemplate>,
}

impl CustomTemplates {
    /// An empty table, without the built-in entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The built-in entries: `react` and `react-component`, both on top of `new`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = Self::empty();
        templates.insert("react", CustomTemplate::extending("new"));
        templates.insert(
            "react-component",
            CustomTemplate::extending("new").with_entry("src/App.js"),
        );
        templates
    }

    /// Built-ins with `overrides` merged on top by identifier.
    #[must_use]
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, CustomTemplate)>,
    {
        let mut templates = Self::builtin();
        templates.entries.extend(overrides);
        templates
    }

    pub fn insert(&mut self, id: impl Into<String>, template: CustomTemplate) {
        self.entries.insert(id.into(), template);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CustomTemplate> {
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

impl Default for CustomTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Entry path used when a fetched sandbox does not name one.
pub(crate) fn default_entry() -> String {
    DEFAULT_ENTRY.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn files(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_to_base_path() {
        assert_eq!(to_base_path("./src/index.js"), "src/index.js");
        assert_eq!(to_base_path("/src/index.js"), "src/index.js");
        assert_eq!(to_base_path("src/index.js"), "src/index.js");
        assert_eq!(to_base_path(".//src/index.js"), "src/index.js");
        assert_eq!(to_base_path(".env"), ".env");
    }

    #[test]
    fn test_new_normalizes_paths() {
        let template = Template::new(
            "new",
            files(&[("./package.json", "{}"), ("/src/index.js", "x")]),
            "/src/index.js",
        );

        assert_eq!(
            template.files.keys().collect::<Vec<_>>(),
            vec!["package.json", "src/index.js"]
        );
        assert_eq!(template.entry, "src/index.js");
        assert_eq!(template.module_path(), "/src/index.js");
    }

    #[test]
    fn test_extend_overlays_custom_fields() {
        let base = Template::new(
            "new",
            files(&[("package.json", "{}"), ("src/App.js", "base")]),
            "src/index.js",
        )
        .with_title("React");
        let custom = CustomTemplate::extending("new")
            .with_entry("./src/App.js")
            .with_file("/src/App.js", "custom")
            .with_file("README.md", "readme");

        let template = Template::extend(&base, "react-component", &custom);

        assert_eq!(template.id, "react-component");
        assert_eq!(template.entry, "src/App.js");
        assert_eq!(template.extends.as_deref(), Some("new"));
        assert_eq!(
            template.files,
            files(&[
                ("README.md", "readme"),
                ("package.json", "{}"),
                ("src/App.js", "custom"),
            ])
        );
        assert_eq!(template.title.as_deref(), Some("React"));
        assert_eq!(template.title_override, None);
    }

    #[test]
    fn test_display_title_precedence() {
        let mut template = Template::new("new", BTreeMap::new(), "src/index.js");
        assert_eq!(template.display_title(None), "");

        template.title = Some("React".to_owned());
        assert_eq!(template.display_title(None), "React");
        assert_eq!(template.display_title(Some("Doc")), "Doc");

        template.title_override = Some("Custom".to_owned());
        assert_eq!(template.display_title(Some("Doc")), "Custom");
    }

    #[test]
    fn test_files_with_entry_replace() {
        let template = Template::new("new", files(&[("src/index.js", "old")]), "src/index.js");

        let block = template.files_with_entry("new", EntryOverride::Replace);

        assert_eq!(block["src/index.js"], "new");
        assert_eq!(template.files["src/index.js"], "old");
    }

    #[test]
    fn test_files_with_entry_keep() {
        let template = Template::new("new", files(&[("src/index.js", "old")]), "src/index.js");

        let block = template.files_with_entry("new", EntryOverride::Keep);

        assert_eq!(block["src/index.js"], "old");
    }

    #[test]
    fn test_files_with_entry_lines() {
        let template = Template::new(
            "new",
            files(&[("src/index.js", "a\nb\nc\nd")]),
            "src/index.js",
        );

        let block = template.files_with_entry("X\nY", EntryOverride::Lines { start: 2, end: 3 });

        assert_eq!(block["src/index.js"], "a\nX\nY\nd");
    }

    #[test]
    fn test_splice_lines_past_end_appends() {
        assert_eq!(splice_lines("a\nb", 5, 6, "z"), "a\nb\nz");
        assert_eq!(splice_lines("", 1, 1, "z"), "z");
    }

    #[test]
    fn test_entry_override_parse() {
        assert_eq!(EntryOverride::parse("true"), Some(EntryOverride::Replace));
        assert_eq!(EntryOverride::parse(""), Some(EntryOverride::Replace));
        assert_eq!(EntryOverride::parse("false"), Some(EntryOverride::Keep));
        assert_eq!(
            EntryOverride::parse("3-5"),
            Some(EntryOverride::Lines { start: 3, end: 5 })
        );
        assert_eq!(
            EntryOverride::parse("4"),
            Some(EntryOverride::Lines { start: 4, end: 4 })
        );
        assert_eq!(EntryOverride::parse("0-2"), None);
        assert_eq!(EntryOverride::parse("5-3"), None);
        assert_eq!(EntryOverride::parse("yes"), None);
    }

    #[test]
    fn test_builtin_custom_templates() {
        let templates = CustomTemplates::builtin();

        assert_eq!(templates.len(), 2);
        assert_eq!(templates.get("react").map(|t| t.extends.as_str()), Some("new"));
        let component = templates.get("react-component").unwrap();
        assert_eq!(component.extends, "new");
        assert_eq!(component.entry.as_deref(), Some("src/App.js"));
    }

    #[test]
    fn test_with_overrides_replaces_by_id() {
        let templates = CustomTemplates::with_overrides([
            ("react".to_owned(), CustomTemplate::extending("react-ts")),
            ("vue".to_owned(), CustomTemplate::extending("vue-base")),
        ]);

        assert_eq!(templates.len(), 3);
        assert_eq!(templates.get("react").unwrap().extends, "react-ts");
        assert!(templates.contains("react-component"));
        assert!(templates.contains("vue"));
    }
}

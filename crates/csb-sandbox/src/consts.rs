//! Internal constants for sandbox creation.

use std::time::Duration;

/// Default sandbox hosting service.
pub const DEFAULT_BASE_URL: &str = "https://codesandbox.io";

/// Default HTTP timeout for sandbox API requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Code block attribute that requests a sandbox.
pub(crate) const DIRECTIVE_KEY: &str = "codesandbox";

/// Code block attribute overriding the iframe style.
pub(crate) const STYLE_KEY: &str = "style";

/// Template id prefix selecting a local directory.
pub(crate) const FILE_TEMPLATE_PREFIX: &str = "file:";

/// Query key selecting the file opened in the sandbox editor.
pub(crate) const MODULE_QUERY_KEY: &str = "module";

/// Query key controlling how the block source is written into the entry file.
pub(crate) const OVERRIDE_ENTRY_KEY: &str = "overrideEntry";

/// Entry file used when a template does not declare one.
pub(crate) const DEFAULT_ENTRY: &str = "src/index.js";

/// Project manifest required in local directory templates.
pub(crate) const MANIFEST_FILE: &str = "package.json";

/// Optional sandbox configuration that may pin the template kind.
pub(crate) const SANDBOX_CONFIG_FILE: &str = "sandbox.config.json";

/// Housekeeping files skipped when reading a local directory template.
pub(crate) const EXCLUDED_PATTERNS: &[&str] = &[
    ".git",
    ".gitignore",
    ".DS_Store",
    "*.log",
    "node_modules",
    "package-lock.json",
    "yarn.lock",
];

/// Badge image path (relative to the base URL) used by button mode.
pub(crate) const BADGE_PATH: &str = "/static/img/play-codesandbox.svg";

/// Badge alt text used by button mode.
pub(crate) const BADGE_ALT: &str = "Edit on CodeSandbox";

/// Query parameters applied in iframe mode when no base query is configured.
pub(crate) const IFRAME_DEFAULT_QUERY: &[(&str, &str)] = &[
    ("fontsize", "14px"),
    ("hidenavigation", "1"),
    ("theme", "dark"),
];

/// Inline style of the embedded iframe.
pub(crate) const IFRAME_STYLE: &str =
    "width:100%; height:500px; border:0; border-radius: 4px; overflow:hidden;";

/// Feature policy of the embedded iframe.
pub(crate) const IFRAME_ALLOW: &str = "geolocation; microphone; camera; midi; vr; accelerometer; gyroscope; payment; ambient-light-sensor; encrypted-media; usb";

/// Sandbox flags of the embedded iframe.
pub(crate) const IFRAME_SANDBOX: &str =
    "allow-modals allow-forms allow-popups allow-scripts allow-same-origin";

//! Error types for sandbox creation.

use std::path::PathBuf;

use csb_markdown::TreeError;

/// Errors returned by the sandbox hosting API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed")]
    HttpRequest(#[from] ureq::Error),

    /// Server answered with a non-success status.
    #[error("HTTP error: {status} - {body}")]
    HttpResponse { status: u16, body: String },

    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a transform run.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A local directory template has no `package.json`.
    #[error("{} is required in template directory {}", manifest, path.display())]
    MissingManifest {
        path: PathBuf,
        manifest: &'static str,
    },

    #[error("cannot use template \"{template_id}\": {reason}")]
    UnsupportedEnvironment {
        template_id: String,
        reason: &'static str,
    },

    #[error("failed to get the sandbox template \"{template_id}\"")]
    TemplateFetch {
        template_id: String,
        #[source]
        source: ApiError,
    },

    #[error("circular template inheritance: {chain}")]
    CircularTemplate { chain: String },

    #[error("failed to create a sandbox from template \"{template_id}\"")]
    SandboxCreate {
        template_id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to read template directory {}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {}", path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode sandbox parameters: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

//! Sandbox hosting API.
//!
//! [`SandboxApi`] is the seam between the transformer and the remote
//! service. [`CodeSandboxClient`] talks to the CodeSandbox REST API:
//!
//! - `GET  {base}/api/v1/sandboxes/{id}` fetches a sandbox used as template
//! - `POST {base}/api/v1/sandboxes/define` creates a sandbox from files

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::consts::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::ApiError;

/// Operations the transformer needs from a sandbox hosting service.
pub trait SandboxApi {
    /// Fetch an existing sandbox by id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-success status or an
    /// unreadable body.
    fn fetch_sandbox(&self, id: &str) -> Result<SandboxData, ApiError>;

    /// Create a sandbox from encoded define parameters and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-success status or an
    /// unreadable body.
    fn define_sandbox(&self, parameters: &str) -> Result<String, ApiError>;
}

/// Response envelope of `GET /api/v1/sandboxes/{id}`.
#[derive(Debug, Deserialize)]
pub struct SandboxResponse {
    pub data: SandboxData,
}

/// A sandbox as listed by the service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Entry file path, possibly with a leading `/`.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub directories: Vec<DirectoryRecord>,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

/// A directory in a sandbox listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub shortid: String,
    /// Parent directory; `None` at the sandbox root.
    #[serde(default)]
    pub directory_shortid: Option<String>,
    pub title: String,
}

/// A file in a sandbox listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub shortid: String,
    #[serde(default)]
    pub directory_shortid: Option<String>,
    pub title: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Serialize)]
struct DefineRequest<'a> {
    parameters: &'a str,
    json: u8,
}

#[derive(Deserialize)]
struct DefineResponse {
    sandbox_id: String,
}

/// Create an HTTP agent with the given timeout.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// CodeSandbox REST API client.
pub struct CodeSandboxClient {
    agent: Agent,
    base_url: String,
}

impl CodeSandboxClient {
    /// Create a client for `base_url` with the default timeout.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: create_agent(DEFAULT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Set the timeout applied to each request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = create_agent(timeout);
        self
    }

    fn api_url(&self) -> String {
        format!("{}/api/v1", self.base_url)
    }
}

impl Default for CodeSandboxClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Turn a non-success response into [`ApiError::HttpResponse`].
fn check_status(response: &mut ureq::http::Response<ureq::Body>) -> Result<(), ApiError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = response
        .body_mut()
        .read_to_string()
        .unwrap_or_else(|_| "(unable to read error body)".to_owned());
    Err(ApiError::HttpResponse { status, body })
}

impl SandboxApi for CodeSandboxClient {
    fn fetch_sandbox(&self, id: &str) -> Result<SandboxData, ApiError> {
        let url = format!("{}/sandboxes/{id}", self.api_url());
        tracing::debug!(url = %url, "Fetching sandbox");

        let mut response = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .call()?;
        check_status(&mut response)?;

        let body: SandboxResponse = response.body_mut().read_json()?;
        Ok(body.data)
    }

    fn define_sandbox(&self, parameters: &str) -> Result<String, ApiError> {
        let url = format!("{}/sandboxes/define", self.api_url());
        tracing::debug!(url = %url, "Defining sandbox");

        let mut response = self
            .agent
            .post(&url)
            .header("Accept", "application/json")
            .send_json(&DefineRequest {
                parameters,
                json: 1,
            })?;
        check_status(&mut response)?;

        let body: DefineResponse = response.body_mut().read_json()?;
        Ok(body.sandbox_id)
    }
}

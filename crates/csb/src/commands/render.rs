//! `render` command implementation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use csb_config::{CliSettings, Config, QueryValue};
use csb_markdown::Document;
use csb_sandbox::{
    CodeSandboxClient, CustomTemplate, CustomTemplates, Mode, QuerySource, SandboxApi,
    SandboxTransformer, TemplateCache, TransformOptions, TransformReport,
};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Markdown files to transform.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to configuration file (default: auto-discover csb.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write transformed files into this directory instead of stdout.
    #[arg(short, long, conflicts_with = "in_place")]
    out_dir: Option<PathBuf>,

    /// Overwrite each input file with its transformed content.
    #[arg(short, long)]
    in_place: bool,

    /// Transform mode: meta, button or iframe.
    #[arg(short, long)]
    mode: Option<String>,

    /// Create sandboxes through the define API instead of linking to it.
    #[arg(long)]
    auto_deploy: bool,

    /// Sandbox service base URL.
    #[arg(long, env = "CSB_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

/// Where rendered markdown goes.
#[derive(Debug, PartialEq, Eq)]
enum Destination {
    Stdout,
    File(PathBuf),
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, a file cannot be read or
    /// written, or a sandbox cannot be resolved.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            mode: self.mode.clone(),
            auto_deploy: self.auto_deploy.then_some(true),
            base_url: self.base_url.clone(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        if let Some(path) = &config.config_path {
            output.info(&format!("Using config: {}", path.display()));
        }

        let client = CodeSandboxClient::new(&config.sandbox.base_url)
            .with_timeout(config.sandbox.timeout());
        let transformer = build_transformer(&config, Arc::new(client))?;

        if let Some(out_dir) = &self.out_dir {
            std::fs::create_dir_all(out_dir)?;
        }

        let mut cache = TemplateCache::new();
        let mut total = 0;
        for file in &self.files {
            let source = std::fs::read_to_string(file)?;
            let (rendered, report) = render_source(&transformer, &mut cache, &source, file)?;
            total += report.sandboxes.len();

            match self.destination(file)? {
                Destination::Stdout => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(rendered.as_bytes())?;
                    stdout.flush()?;
                }
                Destination::File(path) => {
                    std::fs::write(&path, rendered)?;
                    output.info(&format!("Wrote {}", path.display()));
                }
            }

            if report.is_empty() {
                output.warning(&format!("{}: no sandbox directives", file.display()));
                continue;
            }
            output.file(&file.display().to_string());
            for sandbox in &report.sandboxes {
                output.info(&format!("  {} -> {}", sandbox.template_id, sandbox.url));
            }
        }

        output.success(&format!(
            "Rendered {} sandbox(es) in {} file(s)",
            total,
            self.files.len()
        ));
        Ok(())
    }

    fn destination(&self, file: &Path) -> Result<Destination, CliError> {
        if self.in_place {
            return Ok(Destination::File(file.to_path_buf()));
        }
        let Some(out_dir) = &self.out_dir else {
            return Ok(Destination::Stdout);
        };
        let name = file.file_name().ok_or_else(|| {
            CliError::Validation(format!("not a file path: {}", file.display()))
        })?;
        Ok(Destination::File(out_dir.join(name)))
    }
}

/// Build transform options from the loaded configuration.
fn transform_options(config: &Config) -> Result<TransformOptions, CliError> {
    let sandbox = &config.sandbox;
    let mode: Mode = sandbox.mode.parse()?;

    let query = sandbox.query.as_ref().map(|query| match query {
        QueryValue::Raw(raw) => QuerySource::Raw(raw.clone()),
        QueryValue::Table(table) => QuerySource::Map(
            table
                .iter()
                .map(|(key, value)| (key.clone(), value.to_string()))
                .collect(),
        ),
    });

    let custom_templates = CustomTemplates::with_overrides(config.templates.iter().map(
        |(id, template)| {
            (
                id.clone(),
                CustomTemplate {
                    extends: template.extends.clone(),
                    entry: template.entry.clone(),
                    files: template.files.clone(),
                    title: template.title.clone(),
                },
            )
        },
    ));

    Ok(TransformOptions {
        mode,
        base_url: sandbox.base_url.clone(),
        query,
        style: sandbox.style.clone(),
        auto_deploy: sandbox.auto_deploy,
        custom_templates,
    })
}

fn build_transformer(
    config: &Config,
    api: Arc<dyn SandboxApi>,
) -> Result<SandboxTransformer, CliError> {
    let options = transform_options(config)?;
    Ok(SandboxTransformer::with_options(api, options).working_dir(config.base_dir.clone()))
}

/// Transform one markdown source, returning the rendered text and report.
fn render_source(
    transformer: &SandboxTransformer,
    cache: &mut TemplateCache,
    source: &str,
    path: &Path,
) -> Result<(String, TransformReport), CliError> {
    let mut doc = Document::parse(source);
    let report = transformer
        .transform_with_cache(&mut doc, Some(path), cache)
        .map_err(|source| CliError::Sandbox {
            path: path.display().to_string(),
            source,
        })?;
    Ok((doc.to_markdown(), report))
}

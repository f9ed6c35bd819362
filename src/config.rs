//! TOML configuration with environment overrides.
//!
//! The file is read once at startup and shared behind an `Arc` by the
//! server and the CLI commands. Secrets and the comma-separated exclusion
//! knobs can also come from the environment (optionally via a `.env` file),
//! which takes precedence over the file.
//!
//! # Example
//!
//! ```toml
//! [gitlab]
//! api_base_url = "https://gitlab.example.com/api/v4"
//! project_id = "42"
//!
//! [filter]
//! exclude_extensions = ["lock", "toml"]
//! exclude_folders = ["tests", "integration_tests"]
//!
//! [docs]
//! root = "./data/documentation/docs"
//! exclude_paths = ["index.md"]
//!
//! [storage]
//! changes_dir = "./data/mr-changes"
//! index_dir = "./indexes/mr-change-summary"
//! docs_index_dir = "./indexes/docs"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-large"
//! dims = 3072
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use mrdoc_core::filter::{split_list, FilterPolicy};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

/// May be omitted from the file entirely when `GITLAB_API_BASE_URL` and
/// `GITLAB_PROJECT_ID` are set; empty values are rejected by [`Config::validate`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GitLabConfig {
    /// REST base, e.g. `https://gitlab.com/api/v4`.
    pub api_base_url: String,
    pub project_id: String,
    /// Personal/project access token. Usually supplied via `GITLAB_ACCESS_TOKEN`.
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            project_id: String::new(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Exclusion rules for merge-request change sets.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_folders: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Paths relative to `root` that are never indexed.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/documentation"),
            include_globs: default_include_globs(),
            exclude_paths: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.mdx".to_string(),
        "**/*.txt".to_string(),
        "**/*.rst".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding `{mr_id}.txt` change logs.
    #[serde(default = "default_changes_dir")]
    pub changes_dir: PathBuf,
    /// Parent directory of the per-merge-request indexes.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_docs_index_dir")]
    pub docs_index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            changes_dir: default_changes_dir(),
            index_dir: default_index_dir(),
            docs_index_dir: default_docs_index_dir(),
        }
    }
}

fn default_changes_dir() -> PathBuf {
    PathBuf::from("./data/mr-changes")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./indexes/mr-change-summary")
}
fn default_docs_index_dir() -> PathBuf {
    PathBuf::from("./indexes/docs")
}

impl StorageConfig {
    /// Index directory for one merge request.
    pub fn merge_request_index_dir(&self, mr_id: u64) -> PathBuf {
        self.index_dir.join(mr_id.to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    1024
}
fn default_overlap() -> usize {
    20
}

/// Embedding backends. Unknown names are rejected when the file is parsed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Disabled,
    #[serde(alias = "open_ai")]
    OpenAi,
    #[serde(alias = "hugging_face")]
    HuggingFace,
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmbeddingProvider::Disabled => "disabled",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::HuggingFace => "huggingface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Outbound HTTP(S) proxy for provider calls.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Disabled,
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            proxy: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingProvider::Disabled
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(alias = "open_ai")]
    OpenAi,
    Fireworks,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Fireworks => "fireworks",
        };
        f.write_str(name)
    }
}

/// Completion model used downstream for summaries and doc rewrites.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    /// Policy applied to merge-request change sets.
    pub fn change_filter(&self) -> FilterPolicy {
        FilterPolicy::new()
            .with_extensions(&self.filter.exclude_extensions)
            .with_folders(&self.filter.exclude_folders)
    }

    /// Policy applied to documentation source files (exact paths only).
    pub fn docs_filter(&self) -> FilterPolicy {
        FilterPolicy::new().with_exact_paths(&self.docs.exclude_paths)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GITLAB_API_BASE_URL") {
            self.gitlab.api_base_url = url;
        }
        if let Some(id) = lookup("GITLAB_PROJECT_ID") {
            self.gitlab.project_id = id;
        }
        if let Some(token) = lookup("GITLAB_ACCESS_TOKEN") {
            self.gitlab.access_token = Some(token);
        }
        if let Some(exts) = lookup("CODE_CHANGE_EXCLUDE_FILE_EXT") {
            self.filter.exclude_extensions = split_list(&exts);
        }
        if let Some(folders) = lookup("CODE_CHANGE_EXCLUDE_FOLDER_PATHS") {
            self.filter.exclude_folders = split_list(&folders);
        }
        if let Some(paths) = lookup("DOC_EXCLUDE_FILE_PATHS") {
            self.docs.exclude_paths = split_list(&paths);
        }
        if let Some(proxy) = lookup("PROXY") {
            if !proxy.trim().is_empty() {
                self.embedding.proxy = Some(proxy);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gitlab.api_base_url.trim().is_empty() {
            bail!("gitlab.api_base_url must not be empty");
        }
        if self.gitlab.project_id.trim().is_empty() {
            bail!("gitlab.project_id must not be empty");
        }

        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            bail!("chunking.overlap_tokens must be < chunking.max_tokens");
        }

        if self.embedding.is_enabled() {
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }

        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                bail!("llm.model must not be empty");
            }
        }

        Ok(())
    }
}

/// Parse configuration text, apply overrides, and validate.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_overrides(lookup);
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, overlaying process environment variables.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, |key| std::env::var(key).ok())
}

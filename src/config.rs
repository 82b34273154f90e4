use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Crawl root: `<root>/<domain>/<job>/...`.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
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
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_domain_workers")]
    pub domain_workers: usize,
    #[serde(default = "default_scoring_workers")]
    pub scoring_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_batch_requests")]
    pub max_batch_requests: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            domain_workers: default_domain_workers(),
            scoring_workers: default_scoring_workers(),
            queue_capacity: default_queue_capacity(),
            max_batch_requests: default_max_batch_requests(),
        }
    }
}

fn default_domain_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_scoring_workers() -> usize {
    1
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_batch_requests() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolveConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

pub const DEFAULT_THRESHOLD: f32 = 0.75;

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    let t = config.resolve.threshold;
    if !(t > 0.0 && t <= 1.0) {
        anyhow::bail!("resolve.threshold must be in (0.0, 1.0]");
    }

    // Validate workers
    let w = &config.workers;
    if w.domain_workers == 0 || w.scoring_workers == 0 {
        anyhow::bail!("workers.domain_workers and workers.scoring_workers must be > 0");
    }
    if w.queue_capacity == 0 {
        anyhow::bail!("workers.queue_capacity must be > 0");
    }
    if w.max_batch_requests == 0 {
        anyhow::bail!("workers.max_batch_requests must be > 0");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/pplink.sqlite"

[store]
root = "./crawl"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.workers.scoring_workers, 1);
        assert!(config.workers.domain_workers >= 1);
        assert!((config.resolve.threshold - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.resolve.threshold = 1.5;
        assert!(validate(&config).is_err());
        config.resolve.threshold = 0.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_remote_provider_requires_model_and_dims() {
        let content = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let config = parse_config(&content).unwrap();
        assert!(validate(&config).is_err());

        let content = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
            MINIMAL
        );
        let config = parse_config(&content).unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn test_unknown_provider() {
        let content = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let config = parse_config(&content).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let content = format!("{}\n[workers]\nscoring_workers = 0\n", MINIMAL);
        let config = parse_config(&content).unwrap();
        assert!(validate(&config).is_err());
    }
}

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tagline_categorize::{LlmSettings, OrchestratorConfig, Provider};

use crate::state::ensure_tagline_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub categorize: CategorizeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    pub enabled: bool,
    pub provider: Provider,
    /// Unset means the provider's default model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Unset means the provider's public endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    /// Token budget for one-transaction requests
    pub max_tokens: u32,
    /// Token budget for chunk requests
    pub batch_max_tokens: u32,
    pub chunk_size: usize,
    pub inter_chunk_delay_ms: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CategorizeSection {
    pub review_threshold: f64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: Provider::default(),
            model: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 300,
            batch_max_tokens: 4000,
            chunk_size: 50,
            inter_chunk_delay_ms: 500,
            retry_delay_ms: 1000,
        }
    }
}

impl LlmSection {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.provider.default_base_url())
    }
}

impl Default for CategorizeSection {
    fn default() -> Self {
        Self {
            review_threshold: 0.80,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.categorize.review_threshold)?;
        if self.llm.chunk_size == 0 {
            bail!("llm.chunk_size must be at least 1");
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            bail!("llm.temperature must be a non-negative number");
        }
        Ok(())
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            max_tokens: self.llm.max_tokens,
            batch_max_tokens: self.llm.batch_max_tokens,
            temperature: self.llm.temperature,
            inter_chunk_delay: Duration::from_millis(self.llm.inter_chunk_delay_ms),
            retry_delay: Duration::from_millis(self.llm.retry_delay_ms),
            ..LlmSettings::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            review_threshold: self.categorize.review_threshold,
            enable_llm: self.llm.enabled,
            chunk_size: self.llm.chunk_size,
        }
    }
}

pub fn check_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        bail!("review threshold must be between 0.0 and 1.0 (got {threshold})");
    }
    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tagline_home()?.join("config.toml"))
}

/// Missing file means defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config_to(&p, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.llm.model(), "claude-sonnet-4-20250514");
        assert_eq!(cfg.llm.base_url(), "https://api.anthropic.com");
        assert_eq!(cfg.categorize.review_threshold, 0.80);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.llm.provider = Provider::OpenAI;
        cfg.llm.chunk_size = 25;
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.llm.model(), "gpt-4o-mini");
        assert_eq!(loaded.llm.base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_provider_switch_follows_provider_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\nprovider = \"openai\"\n").unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.llm.provider, Provider::OpenAI);
        assert_eq!(cfg.llm.model(), "gpt-4o-mini");
        assert_eq!(cfg.llm.base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_explicit_model_and_endpoint_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\nbase_url = \"http://localhost:11434\"\n",
        )
        .unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.llm.model(), "gpt-4o");
        assert_eq!(cfg.llm.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[categorize]\nreview_threshold = 0.9\n[llm]\nprovider = \"openai\"\n").unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.categorize.review_threshold, 0.9);
        assert_eq!(cfg.llm.provider, Provider::OpenAI);
        assert_eq!(cfg.llm.max_tokens, 300);
        assert_eq!(cfg.llm.base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[categorize]\nreview_threshold = 1.5\n").unwrap();
        assert!(load_config_from(&path).is_err());

        fs::write(&path, "[llm]\nchunk_size = 0\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_settings_mapping() {
        let mut cfg = Config::default();
        cfg.llm.inter_chunk_delay_ms = 0;
        cfg.llm.enabled = false;
        let s = cfg.llm_settings();
        assert_eq!(s.inter_chunk_delay, Duration::ZERO);
        assert_eq!(s.retry_delay, Duration::from_secs(1));
        assert_eq!(s.batch_max_tokens, 4000);
        let o = cfg.orchestrator_config();
        assert!(!o.enable_llm);
        assert_eq!(o.chunk_size, 50);
    }
}

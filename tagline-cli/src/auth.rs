use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tagline_categorize::{LlmCredential, Provider};
use tracing::debug;

use crate::state::ensure_tagline_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthState {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AuthState {
    fn key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::OpenAI => self.openai_api_key.as_deref(),
        }
        .map(str::trim)
        .filter(|k| !k.is_empty())
    }
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_tagline_home()?.join("auth.json"))
}

pub fn load_auth_from(path: &Path) -> Result<AuthState> {
    if !path.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

pub fn save_auth_to(path: &Path, auth: &AuthState) -> Result<()> {
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Environment variable first, then the stored key.
pub fn resolve_credential_with(provider: Provider, auth: &AuthState) -> Option<LlmCredential> {
    if let Some(cred) = LlmCredential::from_env(provider) {
        debug!(provider = %provider, "using API key from environment");
        return Some(cred);
    }
    auth.key_for(provider)
        .map(|k| LlmCredential::new(provider, k))
}

pub fn resolve_credential(provider: Provider) -> Result<Option<LlmCredential>> {
    let auth = load_auth_from(&auth_path()?)?;
    Ok(resolve_credential_with(provider, &auth))
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn paste_anthropic_key() -> Result<()> {
    let p = auth_path()?;
    let mut auth = load_auth_from(&p)?;
    let key = prompt_secret("Paste Anthropic API key (starts with sk-ant-)")?;
    if !key.starts_with("sk-ant-") {
        bail!("key didn't look like an Anthropic API key (expected prefix sk-ant-)");
    }
    auth.anthropic_api_key = Some(key);
    save_auth_to(&p, &auth)?;
    println!("Saved Anthropic API key to {}", p.display());
    Ok(())
}

pub fn paste_openai_key() -> Result<()> {
    let p = auth_path()?;
    let mut auth = load_auth_from(&p)?;
    let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
    if !key.starts_with("sk-") {
        bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
    }
    auth.openai_api_key = Some(key);
    save_auth_to(&p, &auth)?;
    println!("Saved OpenAI API key to {}", p.display());
    Ok(())
}

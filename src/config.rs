use anyhow::{Context, Result};
use std::time::Duration;

use crate::pipeline::DEFAULT_REMOTE_TIMEOUT;
use crate::variants::MAX_VARIANTS;

pub const DEMO_KEY: &str = "DEMO_KEY";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the Gemini client in demo mode.
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub port: u16,
    pub remote_timeout: Duration,
    pub variant_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty() && k != DEMO_KEY);
        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let timeout_secs =
            parse_or(&lookup, "REMOTE_CALL_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT.as_secs())?;
        let variant_concurrency = parse_or(&lookup, "VARIANT_CONCURRENCY", 4usize)?;
        Ok(Self {
            api_key,
            api_base: lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            image_model: lookup("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.into()),
            text_model: lookup("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.into()),
            port,
            remote_timeout: Duration::from_secs(timeout_secs.max(1)),
            variant_concurrency: variant_concurrency.clamp(1, MAX_VARIANTS),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_to_demo_mode() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.remote_timeout, Duration::from_secs(120));
        assert!(config(&[("GEMINI_API_KEY", "DEMO_KEY")]).unwrap().api_key.is_none());
    }

    #[test]
    fn concurrency_is_clamped() {
        let concurrency =
            |raw: &str| config(&[("VARIANT_CONCURRENCY", raw)]).unwrap().variant_concurrency;
        assert_eq!(concurrency("50"), MAX_VARIANTS);
        assert_eq!(concurrency("0"), 1);
    }

    #[test]
    fn bad_numbers_are_startup_errors() {
        assert!(config(&[("PORT", "eighty")]).is_err());
    }
}

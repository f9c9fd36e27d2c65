//! Runtime configuration read from the environment.

use anyhow::{Context, Result};
use std::env;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_DB_PATH: &str = "math_ocr.db";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Service configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Path to the SQLite results database.
    pub db_path: String,
    /// Multimodal model the extraction client prompts.
    pub model: String,
    /// OpenRouter API key. The only required variable.
    pub api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;

        Ok(Self {
            bind: env::var("MATH_OCR_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            db_path: env::var("MATH_OCR_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            model: env::var("MATH_OCR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }
}

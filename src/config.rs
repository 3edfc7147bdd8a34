use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.dify.ai/v1";
pub const DEFAULT_METABASE_URL: &str =
    "http://localhost:3001/public/dashboard/622f0785-8c37-4bea-bc66-218e8b21fa6d";
pub const DEFAULT_SUPERSET_URL: &str =
    "http://localhost:8088/superset/dashboard/your-id-here/?standalone=true";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_ai_base_url() -> String {
    DEFAULT_AI_BASE_URL.to_string()
}

fn default_metabase_url() -> String {
    DEFAULT_METABASE_URL.to_string()
}

fn default_superset_url() -> String {
    DEFAULT_SUPERSET_URL.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the FinWise REST backend.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL of the conversational AI service (`/chat-messages` is appended).
    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,

    #[serde(default = "default_metabase_url")]
    pub metabase_url: String,

    #[serde(default = "default_superset_url")]
    pub superset_url: String,

    /// Show canned demo data when the backend cannot be reached.
    #[serde(default = "default_true")]
    pub demo_fallback: bool,

    /// Per-request timeout; the HTTP client default applies when unset.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Timestamp of the last successful backend sync.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            ai_base_url: default_ai_base_url(),
            metabase_url: default_metabase_url(),
            superset_url: default_superset_url(),
            demo_fallback: true,
            request_timeout_secs: None,
            last_sync_at: None,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Embed URL for a BI tool; a non-empty override wins.
    pub fn bi_url(&self, tool: BiTool, override_url: Option<&str>) -> String {
        if let Some(url) = override_url.map(str::trim).filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        match tool {
            BiTool::Metabase => self.metabase_url.clone(),
            BiTool::Superset => self.superset_url.clone(),
        }
    }

    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "api_base" => self.api_base = value.to_string(),
            "ai_base_url" => self.ai_base_url = value.to_string(),
            "metabase_url" => self.metabase_url = value.to_string(),
            "superset_url" => self.superset_url = value.to_string(),
            "demo_fallback" => {
                self.demo_fallback = value
                    .parse()
                    .with_context(|| format!("demo_fallback expects true/false, got '{value}'"))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(value.parse().with_context(|| {
                        format!("request_timeout_secs expects seconds, got '{value}'")
                    })?)
                }
            }
            other => anyhow::bail!("Unknown config key: '{other}'"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BiTool {
    Metabase,
    Superset,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn activity_log(&self) -> PathBuf {
        self.data_dir.join("activity.json")
    }

    pub fn chat_transcript(&self) -> PathBuf {
        self.data_dir.join("chat.json")
    }
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    let paths = if let Some(home) = override_home {
        AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        }
    } else {
        let proj = ProjectDirs::from("vn", "finwise", "finwise")
            .context("Failed to resolve platform directories")?;
        AppPaths {
            config_dir: proj.config_dir().to_path_buf(),
            data_dir: proj.data_dir().to_path_buf(),
        }
    };

    fs::create_dir_all(&paths.data_dir)
        .with_context(|| format!("Failed to create data dir {}", paths.data_dir.display()))?;
    Ok(paths)
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    // Older files lack newer keys; serde filled the defaults, persist them.
    let on_disk: serde_json::Value = serde_json::from_str(&raw)?;
    let current = serde_json::to_value(&cfg)?;
    let missing_keys = match (on_disk.as_object(), current.as_object()) {
        (Some(old), Some(new)) => new.keys().any(|k| !old.contains_key(k)),
        _ => false,
    };
    if missing_keys {
        write_config(&cfg_path, &cfg)?;
    }

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Lowercase, dash-separated identifier safe for ids and file names.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            ' ' | ':' | '/' | '\\' | '@' | '.' => Some('-'),
            _ => None,
        };
        if let Some(c) = mapped {
            if !(c == '-' && out.ends_with('-')) {
                out.push(c);
            }
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

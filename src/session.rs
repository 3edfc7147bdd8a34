use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{now_utc, slug};

/// The signed-in user. Authentication is mocked: any well-formed e-mail is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Identifier sent to the AI services.
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join("session.json"),
        }
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let session: Session = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(session))
    }

    pub fn login(&self, email: &str, name: Option<String>) -> Result<Session> {
        let email = email.trim();
        let valid = email
            .split_once('@')
            .is_some_and(|(user, host)| !user.is_empty() && host.contains('.'));
        if !valid {
            bail!("Invalid e-mail address: '{email}'");
        }

        let session = Session {
            email: email.to_string(),
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            user_id: slug(email),
            started_at: now_utc(),
        };
        let json = serde_json::to_string_pretty(&session)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(session)
    }

    /// Returns whether a session existed.
    pub fn logout(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }

    pub fn require(&self) -> Result<Session> {
        self.load()?
            .ok_or_else(|| anyhow!("Not logged in. Run: finwise login --email <email>"))
    }
}

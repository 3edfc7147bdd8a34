use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

pub const ACTIVITY_CAPACITY: usize = 8;

/// Human-readable status lines, newest first, bounded to [`ACTIVITY_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog {
    entries: VecDeque<String>,
}

impl ActivityLog {
    pub fn push(&mut self, message: impl AsRef<str>) {
        self.push_at(Local::now().time(), message);
    }

    pub fn push_at(&mut self, at: NaiveTime, message: impl AsRef<str>) {
        self.entries
            .push_front(format!("[{}] {}", at.format("%H:%M:%S"), message.as_ref()));
        self.entries.truncate(ACTIVITY_CAPACITY);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut log: ActivityLog = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log.entries.truncate(ACTIVITY_CAPACITY);
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).expect("valid time")
    }

    #[test]
    fn newest_first_and_bounded() {
        let mut log = ActivityLog::default();
        for i in 0..10 {
            log.push_at(at(9, 0, i), format!("step {i}"));
        }
        assert_eq!(log.iter().count(), ACTIVITY_CAPACITY);
        let lines: Vec<&str> = log.iter().collect();
        assert_eq!(lines[0], "[09:00:09] step 9");
        assert_eq!(lines[ACTIVITY_CAPACITY - 1], "[09:00:02] step 2");
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("activity.json");

        assert!(ActivityLog::load(&path).expect("load missing").is_empty());

        let mut log = ActivityLog::default();
        log.push_at(at(12, 30, 0), "Backend sync succeeded.");
        log.save(&path).expect("save");

        let back = ActivityLog::load(&path).expect("load");
        assert_eq!(back, log);
    }
}

// replay.rs - Marker left behind when a batch is stopped by an anti-bot block
//
// A block means the rest of the batch has to be re-run later. Already
// resolved domains are skipped through the result journal, so the marker only
// records why and where the run stopped; the next run reports it and removes
// it once a run gets through without being blocked.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::evidence::SourceKind;
use crate::resolver::Stage;

/// Hidden file to avoid cluttering the output directory
pub const REPLAY_FILENAME: &str = ".companyfinder-replay.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMarker {
    pub created_at: DateTime<Utc>,
    /// Domain that was in flight when the block hit
    pub domain: String,
    pub stage: Stage,
    pub source: SourceKind,
    /// Domains stored before the block
    pub stored: usize,
    /// Domains not attempted, the blocked one included
    pub remaining: usize,
}

impl ReplayMarker {
    pub fn new(domain: &str, stage: Stage, source: SourceKind, stored: usize, remaining: usize) -> Self {
        Self {
            created_at: Utc::now(),
            domain: domain.to_string(),
            stage,
            source,
            stored,
            remaining,
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(REPLAY_FILENAME)
    }

    pub fn exists(output_dir: &Path) -> bool {
        Self::path(output_dir).exists()
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(Self::path(output_dir))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a temp file then rename, so an interrupt never leaves half a marker.
    pub fn save(&self, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let path = Self::path(output_dir);
        let temp_path = output_dir.join(".companyfinder-replay.tmp");
        let content = serde_json::to_string_pretty(self)?;

        {
            let mut file = std::fs::File::create(&temp_path)?;
            std::io::Write::write_all(&mut file, content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Remove the marker after a run that finished unblocked.
    pub fn clear(output_dir: &Path) -> Result<()> {
        let path = Self::path(output_dir);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReplayMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Blocked by {} during {} of '{}' at {} - {} stored, {} remaining",
            self.source,
            self.stage,
            self.domain,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.stored,
            self.remaining
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        assert!(!ReplayMarker::exists(tmp.path()));

        let marker = ReplayMarker::new("acme.com", Stage::RegistryLookup, SourceKind::WebSearch, 3, 7);
        marker.save(tmp.path()).unwrap();
        assert!(ReplayMarker::exists(tmp.path()));

        let loaded = ReplayMarker::load(tmp.path()).unwrap();
        assert_eq!(loaded, marker);
        assert!(loaded.to_string().contains("acme.com"));

        ReplayMarker::clear(tmp.path()).unwrap();
        assert!(!ReplayMarker::exists(tmp.path()));
        // clearing twice is fine
        ReplayMarker::clear(tmp.path()).unwrap();
    }

    #[test]
    fn test_load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(ReplayMarker::path(tmp.path()), "{ not json").unwrap();
        assert!(ReplayMarker::load(tmp.path()).is_err());
    }
}

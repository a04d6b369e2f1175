use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Summary of one encounter, reported to the host when the scene ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResults {
    /// Stays true unless the player was deleted.
    pub runaway: bool,
    pub player_health: i32,
    pub turns: u32,
    pub rounds: u32,
    pub counter_count: u32,
    pub counter_deletions: u32,
    pub battle_seconds: f64,
    pub enemies_deleted: u32,
}

impl Default for BattleResults {
    fn default() -> Self {
        Self {
            runaway: true,
            player_health: 0,
            turns: 0,
            rounds: 0,
            counter_count: 0,
            counter_deletions: 0,
            battle_seconds: 0.0,
            enemies_deleted: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResultsWriteError {
    #[error("failed to serialize battle results: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write battle results to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn write_results_atomic(path: &Path, results: &BattleResults) -> Result<(), ResultsWriteError> {
    let text = serde_json::to_string_pretty(results).map_err(ResultsWriteError::Serialize)?;
    write_text_atomic(path, &text).map_err(|source| ResultsWriteError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    match fs::remove_file(path) {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }
    }
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("results.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn results_replace_previous_file_atomically() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("results").join("last_battle.json");

        let first = BattleResults {
            player_health: 12,
            ..BattleResults::default()
        };
        write_results_atomic(&path, &first).expect("first write");

        let second = BattleResults {
            runaway: false,
            counter_count: 3,
            ..BattleResults::default()
        };
        write_results_atomic(&path, &second).expect("second write");

        let raw = fs::read_to_string(&path).expect("read");
        let parsed: BattleResults = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, second);
        assert!(!temp.path().join("results").join("last_battle.json.tmp").exists());
    }
}

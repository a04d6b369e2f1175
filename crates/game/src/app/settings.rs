use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use battle_engine::battle::BattleCard;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub(crate) const SETTINGS_FILE: &str = "battle.json";
pub(crate) const ENCOUNTER_ENV_VAR: &str = "BATTLE_ENCOUNTER";

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlayerSettings {
    pub(crate) name: String,
    pub(crate) health: i32,
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) texture: String,
    pub(crate) animation: String,
    pub(crate) buster_damage: i32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            name: "MegaMan".to_string(),
            health: 100,
            x: 2,
            y: 2,
            texture: "navis/mega/battle".to_string(),
            animation: "navis/mega/battle".to_string(),
            buster_damage: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FolderCard {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) damage: i32,
    #[serde(default)]
    pub(crate) booster: bool,
}

impl FolderCard {
    pub(crate) fn to_battle_card(&self) -> BattleCard {
        if self.booster {
            BattleCard::booster(self.name.clone())
        } else {
            BattleCard::new(self.name.clone(), self.damage)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct BattleSettings {
    /// Encounter file relative to the asset directory.
    pub(crate) encounter: String,
    pub(crate) player: PlayerSettings,
    pub(crate) folder: Vec<FolderCard>,
    pub(crate) custom_gauge_seconds: f64,
    pub(crate) target_tps: u32,
    pub(crate) window_width: u32,
    pub(crate) window_height: u32,
    pub(crate) results_file: String,
    /// Activities under the battle; at 1 the battle pops straight back to the host.
    pub(crate) activity_depth: usize,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            encounter: "encounters/default.xml".to_string(),
            player: PlayerSettings::default(),
            folder: vec![
                FolderCard {
                    name: "Cannon".to_string(),
                    damage: 40,
                    booster: false,
                },
                FolderCard {
                    name: "Atk+10".to_string(),
                    damage: 0,
                    booster: true,
                },
                FolderCard {
                    name: "Sword".to_string(),
                    damage: 80,
                    booster: false,
                },
                FolderCard {
                    name: "Recov10".to_string(),
                    damage: 0,
                    booster: false,
                },
                FolderCard {
                    name: "HiCannon".to_string(),
                    damage: 60,
                    booster: false,
                },
            ],
            custom_gauge_seconds: 10.0,
            target_tps: 60,
            window_width: 960,
            window_height: 640,
            results_file: "last_battle.json".to_string(),
            activity_depth: 2,
        }
    }
}

impl BattleSettings {
    /// Reads `path`, or falls back to defaults when the file does not exist.
    pub(crate) fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let settings = Self::parse(path, &raw)?;
                info!(path = %path.display(), "settings_loaded");
                Ok(settings)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "settings_missing_using_defaults");
                Ok(Self::default())
            }
            Err(source) => Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub(crate) fn parse(path: &Path, raw: &str) -> Result<Self, SettingsError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Self>(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            let source = error.into_inner();
            let message = if field.is_empty() || field == "." {
                source.to_string()
            } else {
                format!("at {field}: {source}")
            };
            SettingsError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })
    }

    /// `BATTLE_ENCOUNTER` wins over the configured encounter. Relative paths resolve
    /// against the asset directory.
    pub(crate) fn encounter_path(&self, assets_dir: &Path) -> PathBuf {
        let configured = match env::var(ENCOUNTER_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => value,
            Ok(_) | Err(env::VarError::NotPresent) => self.encounter.clone(),
            Err(error) => {
                warn!(env_var = ENCOUNTER_ENV_VAR, error = %error, "encounter_env_unreadable");
                self.encounter.clone()
            }
        };
        resolve_against(assets_dir, &configured)
    }

    pub(crate) fn battle_folder(&self) -> Vec<BattleCard> {
        self.folder.iter().map(FolderCard::to_battle_card).collect()
    }
}

fn resolve_against(base: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

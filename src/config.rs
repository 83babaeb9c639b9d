use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Template;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Game configuration loaded from game.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub intro_countdown_secs: u64,
    pub creation_secs: u64,
    pub voting_secs: u64,
    pub empty_session_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub reconnect_grace_secs: u64,
    pub allowed_origins: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 1,
            max_players: 8,
            intro_countdown_secs: 3,
            creation_secs: 90,
            voting_secs: 30,
            empty_session_timeout_secs: 30,
            inactivity_timeout_secs: 30 * 60,
            reconnect_grace_secs: 10,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl GameConfig {
    pub fn intro_countdown(&self) -> Duration {
        Duration::from_secs(self.intro_countdown_secs)
    }

    pub fn creation_time(&self) -> Duration {
        Duration::from_secs(self.creation_secs)
    }

    pub fn voting_time(&self) -> Duration {
        Duration::from_secs(self.voting_secs)
    }

    pub fn empty_session_timeout(&self) -> Duration {
        Duration::from_secs(self.empty_session_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }
}

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_templates() -> Vec<Template> {
    vec![
        Template {
            id: "181913649".to_string(),
            name: "Drake Hotline Bling".to_string(),
            url: "https://i.imgflip.com/30b1gx.jpg".to_string(),
        },
        Template {
            id: "87743020".to_string(),
            name: "Two Buttons".to_string(),
            url: "https://i.imgflip.com/1g8my4.jpg".to_string(),
        },
        Template {
            id: "112126428".to_string(),
            name: "Distracted Boyfriend".to_string(),
            url: "https://i.imgflip.com/1ur9b0.jpg".to_string(),
        },
    ]
}

/// Initialize config directory with defaults if missing.
pub fn init() -> Result<(), ConfigError> {
    let base = config_path("");
    if !base.exists() {
        fs::create_dir_all(&base).map_err(|source| ConfigError::Io {
            path: base.clone(),
            source,
        })?;
    }

    let game_path = config_path("game.json");
    if !game_path.exists() {
        write_json(&game_path, &GameConfig::default())?;
        tracing::info!("Wrote default {}", game_path.display());
    }

    let templates_path = config_path("templates.json");
    if !templates_path.exists() {
        write_json(&templates_path, &default_templates())?;
        tracing::info!("Wrote default {}", templates_path.display());
    }

    Ok(())
}

/// Load the game configuration.
pub fn load_game_config() -> Result<GameConfig, ConfigError> {
    let config: GameConfig = read_json(&config_path("game.json"))?;
    Ok(sanitize(config))
}

/// Load the template catalog. Falls back to the built-in list if the file is empty.
pub fn load_templates() -> Result<Vec<Template>, ConfigError> {
    let templates: Vec<Template> = read_json(&config_path("templates.json"))?;
    if templates.is_empty() {
        tracing::warn!("Template catalog is empty, using built-in templates");
        return Ok(default_templates());
    }
    Ok(templates)
}

fn sanitize(mut config: GameConfig) -> GameConfig {
    if config.min_players == 0 {
        config.min_players = 1;
    }
    if config.max_players < config.min_players {
        tracing::warn!(
            "maxPlayers {} is below minPlayers {}, raising it",
            config.max_players,
            config.min_players
        );
        config.max_players = config.min_players;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: GameConfig = serde_json::from_str(r#"{"maxPlayers": 4}"#).unwrap();
        assert_eq!(config.max_players, 4);
        assert_eq!(config.min_players, 1);
        assert_eq!(config.creation_time(), Duration::from_secs(90));
        assert_eq!(config.intro_countdown(), Duration::from_secs(3));
    }

    #[test]
    fn sanitize_keeps_bounds_consistent() {
        let config = sanitize(GameConfig {
            min_players: 0,
            max_players: 0,
            ..GameConfig::default()
        });
        assert_eq!(config.min_players, 1);
        assert_eq!(config.max_players, 1);
    }
}

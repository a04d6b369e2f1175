use battle_engine::{resolve_app_paths, BattleHost, LoopConfig, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::gameplay::{self, SessionError};
use super::settings::{BattleSettings, SettingsError, SETTINGS_FILE};

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) host: Box<dyn BattleHost>,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Battle Startup ===");

    let paths = resolve_app_paths()?;
    let settings = BattleSettings::load_or_default(&paths.root.join(SETTINGS_FILE))?;
    let config = loop_config(&settings);
    let session = gameplay::build_session(&settings, &paths)?;

    Ok(AppWiring {
        config,
        host: Box::new(session),
    })
}

fn loop_config(settings: &BattleSettings) -> LoopConfig {
    LoopConfig {
        window_width: settings.window_width,
        window_height: settings.window_height,
        target_tps: settings.target_tps,
        ..LoopConfig::default()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_config_takes_window_and_tick_rate_from_settings() {
        let settings = BattleSettings {
            window_width: 480,
            window_height: 320,
            target_tps: 30,
            ..BattleSettings::default()
        };
        let config = loop_config(&settings);
        assert_eq!(config.window_width, 480);
        assert_eq!(config.window_height, 320);
        assert_eq!(config.target_tps, 30);
        assert_eq!(config.max_ticks_per_frame, LoopConfig::default().max_ticks_per_frame);
    }
}

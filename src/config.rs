use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub display: DisplayConfig,
    pub overlay: OverlayConfig,
    pub windows: WindowsConfig,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Имя X-дисплея; по умолчанию берётся из $DISPLAY
    #[serde(default)]
    pub name: Option<String>,
    /// Номер Xinerama-экрана для окна снега, -1 означает весь экран
    pub screen: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverlayConfig {
    pub sticky: bool,
    pub stacking: String,
    pub dock: bool,
    pub use_root_window: bool,
    pub transparent: bool,
    pub double_buffered: bool,
    pub expose_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowsConfig {
    pub keep_snow_on_windows: bool,
    pub update_interval_ms: u64,
    pub force_refresh_every: u32,
    pub soft_lock_retries: u32,
    pub probe_timeout_ms: u64,
    pub event_poll_interval_ms: u64,
    pub offset_x: i32,
    pub offset_y: i32,
    pub all_workspaces: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadConfig {
    pub interval_ms: u64,
    pub excessive_pct: f64,
    pub pressure_high: i32,
    pub pressure_low: i32,
    pub warning_count_max: u32,
}

/// Положение окна снега в стеке окон
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stacking {
    Below,
    Above,
    Unchanged,
}

impl OverlayConfig {
    pub fn stacking(&self) -> Stacking {
        match self.stacking.as_str() {
            "below" => Stacking::Below,
            "above" => Stacking::Above,
            _ => Stacking::Unchanged,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
            },
            display: DisplayConfig {
                name: None,
                screen: -1,
            },
            overlay: OverlayConfig {
                sticky: true,
                stacking: "below".to_string(),
                dock: true,
                use_root_window: false,
                transparent: true,
                double_buffered: true,
                expose_interval_ms: 500,
            },
            windows: WindowsConfig {
                keep_snow_on_windows: true,
                update_interval_ms: 250,
                force_refresh_every: 10,
                soft_lock_retries: 3,
                probe_timeout_ms: 2000,
                event_poll_interval_ms: 10,
                offset_x: 0,
                offset_y: 0,
                all_workspaces: false,
            },
            load: LoadConfig {
                interval_ms: 100,
                excessive_pct: 1.5,
                pressure_high: 10,
                pressure_low: -10,
                warning_count_max: 10,
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("XSNOW_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        match self.overlay.stacking.as_str() {
            "below" | "above" | "none" => {}
            _ => anyhow::bail!("Неверное положение окна снега в стеке: {}", self.overlay.stacking),
        }

        if self.overlay.expose_interval_ms == 0 {
            anyhow::bail!("expose_interval_ms должно быть больше 0");
        }

        // Валидация настроек окон
        if self.windows.update_interval_ms == 0 {
            anyhow::bail!("update_interval_ms должно быть больше 0");
        }
        if self.windows.event_poll_interval_ms == 0 {
            anyhow::bail!("event_poll_interval_ms должно быть больше 0");
        }
        if self.windows.force_refresh_every == 0 {
            anyhow::bail!("force_refresh_every должно быть больше 0");
        }
        if self.windows.soft_lock_retries == 0 {
            anyhow::bail!("soft_lock_retries должно быть больше 0");
        }
        if self.windows.probe_timeout_ms < 10 {
            anyhow::bail!("probe_timeout_ms должно быть минимум 10");
        }

        // Валидация измерителя нагрузки
        if self.load.interval_ms == 0 {
            anyhow::bail!("load.interval_ms должно быть больше 0");
        }
        if self.load.pressure_low >= self.load.pressure_high {
            anyhow::bail!(
                "pressure_low ({}) должно быть меньше pressure_high ({})",
                self.load.pressure_low,
                self.load.pressure_high
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.windows.force_refresh_every = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.overlay.stacking = "sideways".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.load.pressure_low = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.windows.probe_timeout_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stacking_parsing() {
        let mut config = Config::default();
        assert_eq!(config.overlay.stacking(), Stacking::Below);
        config.overlay.stacking = "above".to_string();
        assert_eq!(config.overlay.stacking(), Stacking::Above);
        config.overlay.stacking = "none".to_string();
        assert_eq!(config.overlay.stacking(), Stacking::Unchanged);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/xsnow-test.toml").unwrap();
        assert_eq!(config.windows.force_refresh_every, 10);
        assert_eq!(config.windows.soft_lock_retries, 3);
    }
}

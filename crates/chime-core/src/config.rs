use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Engine constants. The cutoff and horizon are inherited limits of typical
// sleep primitives, kept configurable rather than re-derived.
/// Timers due sooner than this never touch the store; they live as an
/// in-process sleeping task and are lost on restart.
pub const SHORT_TIMER_CUTOFF_SECS: i64 = 60;
/// The dispatch loop never looks further ahead than this many days. Farther
/// timers are picked up by a later pass once they drift inside the window.
pub const DISPATCH_HORIZON_DAYS: i64 = 40;

/// Top-level config (chime.toml + CHIME_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChimeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub timers: TimerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for the timer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Timers due sooner than this many seconds skip persistence entirely.
    #[serde(default = "default_short_timer_cutoff")]
    pub short_timer_cutoff_secs: i64,
    /// Upper bound, in days, on how far ahead the dispatch loop will look.
    #[serde(default = "default_dispatch_horizon")]
    pub dispatch_horizon_days: i64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            short_timer_cutoff_secs: SHORT_TIMER_CUTOFF_SECS,
            dispatch_horizon_days: DISPATCH_HORIZON_DAYS,
        }
    }
}

fn default_short_timer_cutoff() -> i64 {
    SHORT_TIMER_CUTOFF_SECS
}
fn default_dispatch_horizon() -> i64 {
    DISPATCH_HORIZON_DAYS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.toml", home)
}

impl ChimeConfig {
    /// Load config from a TOML file with CHIME_* env var overrides.
    ///
    /// Checks the explicit path argument first, then ~/.chime/chime.toml.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ChimeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHIME_").split("_"))
            .extract()
            .map_err(|e| crate::error::ChimeError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = ChimeConfig::default();
        assert_eq!(config.timers.short_timer_cutoff_secs, 60);
        assert_eq!(config.timers.dispatch_horizon_days, 40);
        assert!(config.database.path.ends_with("/.chime/chime.db"));
    }

    #[test]
    fn toml_overrides_timer_section() {
        let config: ChimeConfig = Figment::new()
            .merge(Toml::string(
                r#"
                [timers]
                short_timer_cutoff_secs = 5

                [database]
                path = "/tmp/test.db"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.timers.short_timer_cutoff_secs, 5);
        // Unset keys fall back to their defaults.
        assert_eq!(config.timers.dispatch_horizon_days, 40);
        assert_eq!(config.database.path, "/tmp/test.db");
    }

    #[test]
    fn empty_source_yields_defaults() {
        let config: ChimeConfig = Figment::new().extract().unwrap();
        assert_eq!(config.timers.short_timer_cutoff_secs, 60);
    }
}

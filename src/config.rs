use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sampling: SamplingConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Default tick interval; consumers may retime their own stream.
    pub tick_ms: u64,
    /// Clamp for consumer-requested intervals.
    pub min_tick_ms: u64,
    pub max_tick_ms: u64,
    /// Rolling-window size of the recorded timeline, in points.
    pub history_points: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            tick_ms: 1000,
            min_tick_ms: 100,
            max_tick_ms: 60_000,
            history_points: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When set, every request must present this token.
    pub token: Option<String>,
}

impl SamplingConfig {
    /// Consumer-requested intervals outside the clamp are pulled back in;
    /// zero would spin the timer.
    pub fn clamp_tick_ms(&self, requested: u64) -> u64 {
        let floor = self.min_tick_ms.max(1);
        requested.max(floor).min(self.max_tick_ms.max(floor))
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gpudash").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.sampling.tick_ms, 1000);
        assert_eq!(config.sampling.history_points, 1000);
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[sampling]
tick_ms = 250
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sampling.tick_ms, 250);
        // Other fields should be defaults
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.sampling.max_tick_ms, 60_000);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[server]
bind_address = "0.0.0.0"
port = 9090

[sampling]
tick_ms = 500
min_tick_ms = 50
max_tick_ms = 10000
history_points = 200

[auth]
token = "s3cret"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.sampling.tick_ms, 500);
        assert_eq!(config.sampling.min_tick_ms, 50);
        assert_eq!(config.sampling.history_points, 200);
        assert_eq!(config.auth.token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn missing_file_returns_default() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn invalid_toml_returns_default() {
        let temp = std::env::temp_dir().join("gpudash_test_invalid.toml");
        std::fs::write(&temp, "this is not valid toml {{{{").unwrap();
        let config = load_config_from_path(&temp);
        assert_eq!(config.sampling.tick_ms, 1000);
        let _ = std::fs::remove_file(&temp);
    }

    #[test]
    fn tick_clamp_bounds_requests() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.clamp_tick_ms(0), 100);
        assert_eq!(sampling.clamp_tick_ms(2000), 2000);
        assert_eq!(sampling.clamp_tick_ms(10_000_000), 60_000);
    }
}

//! Viewer configuration: CLI flags, optional TOML config file, and the
//! built-in defaults, applied in that precedence order (§10).

use serde::Deserialize;

pub fn default_port() -> u16 {
    9999
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewerConfig {
    /// The host's address, where the initial PUNCH is aimed.
    pub host_ip: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty disables decryption (must match the host's password).
    #[serde(default)]
    pub password: String,

    /// Playback device identifier; `None` selects the platform default
    /// output device.
    pub audio_output: Option<String>,
}

impl ViewerConfig {
    pub fn with_port_default() -> Self {
        Self {
            port: default_port(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ViewerConfig::with_port_default();
        assert_eq!(config.port, 9999);
        assert_eq!(config.password, "");
        assert!(config.host_ip.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
            host_ip = "203.0.113.5"
            port = 4000
            password = "hunter2"
        "#;
        let config: ViewerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.host_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.password, "hunter2");
    }
}

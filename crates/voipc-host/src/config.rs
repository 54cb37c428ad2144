//! Host configuration: CLI flags, optional TOML config file, and the
//! built-in defaults, applied in that precedence order (§10).

use serde::Deserialize;

/// The port both endpoints bind and exchange the stream on (§6).
pub fn default_port() -> u16 {
    9999
}

fn default_fps() -> u32 {
    60
}

#[derive(Debug, Default, Deserialize)]
pub struct HostConfig {
    /// The viewer's address, where the initial PUNCH is aimed. The actual
    /// media destination may later drift to whatever source address an
    /// inbound PUNCH carries (§4.8), but an outbound PUNCH needs somewhere
    /// to start.
    pub target_ip: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty disables encryption.
    #[serde(default)]
    pub password: String,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Capture device identifier for desktop audio; `None` selects the
    /// platform default input device.
    pub audio_source: Option<String>,
}

impl HostConfig {
    pub fn with_port_default() -> Self {
        Self {
            port: default_port(),
            fps: default_fps(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = HostConfig::with_port_default();
        assert_eq!(config.port, 9999);
        assert_eq!(config.fps, 60);
        assert_eq!(config.password, "");
        assert!(config.target_ip.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
            target_ip = "203.0.113.5"
            port = 4000
            password = "hunter2"
            fps = 30
        "#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.target_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.fps, 30);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let toml = r#"target_ip = "203.0.113.5""#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.fps, 60);
    }
}

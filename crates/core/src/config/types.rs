use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::engine::FfmpegConfig;
use crate::manager::ManagerConfig;
use crate::streaming::StreamingConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub engine: FfmpegConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_engine_section_parses() {
        let toml = r#"
[engine]
ffmpeg_path = "/usr/local/bin/ffmpeg"
extra_args = ["-hide_banner"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.engine.ffmpeg_path,
            std::path::PathBuf::from("/usr/local/bin/ffmpeg")
        );
        assert_eq!(config.engine.extra_args, vec!["-hide_banner".to_string()]);
    }

    #[test]
    fn test_manager_unbounded_ceiling_parses() {
        let toml = r#"
[manager]
max_running_pipelines = -1
ignore_init_errors = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.manager.max_running_pipelines, -1);
        assert!(config.manager.ignore_init_errors);
    }

    #[test]
    fn test_config_serializes_back_to_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("[manager]"));
        assert!(text.contains("[streaming.retry]"));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Session settings. The operator token and chat are the only required
/// fields; everything else has a sensible default.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Iteration the hunt resumes from. Persisting the counter across
    /// restarts is the operator's job; the loop only reads the seed.
    #[serde(default)]
    pub iteration: u64,
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub hunt: HuntSettings,
}

#[derive(Debug, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_camera_index")]
    pub index: u32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_bridge_addr")]
    pub addr: String,
}

#[derive(Debug, Deserialize)]
pub struct HuntSettings {
    /// Cadence of the operator command poll, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Where diagnostic and encounter stills land.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_camera_index() -> u32 {
    0
}

fn default_camera_width() -> u32 {
    720
}

fn default_camera_height() -> u32 {
    480
}

fn default_bridge_addr() -> String {
    "127.0.0.1:9753".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_output_dir() -> String {
    ".".to_string()
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            addr: default_bridge_addr(),
        }
    }
}

impl Default for HuntSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parse_minimal_settings() {
        let toml = r#"
[telegram]
token = "123:abc"
user_id = 42
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.iteration, 0);
        assert_eq!(settings.telegram.token, "123:abc");
        assert_eq!(settings.telegram.user_id, 42);
        assert_eq!(settings.camera.index, 0);
        assert_eq!(settings.camera.width, 720);
        assert_eq!(settings.camera.height, 480);
        assert_eq!(settings.bridge.addr, "127.0.0.1:9753");
        assert_eq!(settings.hunt.poll_interval_secs, 2);
        assert_eq!(settings.hunt.output_dir, ".");
    }

    #[test]
    fn parse_full_settings() {
        let toml = r#"
iteration = 1234

[telegram]
token = "999:zzz"
user_id = -100200

[camera]
index = 2
width = 1280
height = 720

[bridge]
addr = "10.0.0.5:4000"

[hunt]
poll_interval_secs = 5
output_dir = "/var/hunt"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.iteration, 1234);
        assert_eq!(settings.telegram.user_id, -100200);
        assert_eq!(settings.camera.index, 2);
        assert_eq!(settings.camera.width, 1280);
        assert_eq!(settings.bridge.addr, "10.0.0.5:4000");
        assert_eq!(settings.hunt.poll_interval_secs, 5);
        assert_eq!(settings.hunt.output_dir, "/var/hunt");
    }

    #[test]
    fn missing_telegram_section_is_an_error() {
        let result: std::result::Result<Settings, _> = toml::from_str("iteration = 1");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shinyhunt.toml");
        fs::write(
            &path,
            r#"
iteration = 77

[telegram]
token = "t"
user_id = 1
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.iteration, 77);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Settings::load(&tmp.path().join("nope.toml"));
        assert!(result.is_err());
    }
}

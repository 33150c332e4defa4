use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_TARGET_HEIGHT: u32 = 480;
pub const DEFAULT_QUALITY: f32 = 0.92;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationSetting {
    #[default]
    Columns,
    Rows,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSetting {
    #[default]
    Odd,
    Even,
}

/// Fixed pixel density, or `auto` to fit the configured target height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensitySetting {
    Auto,
    Fixed(u32),
}

impl Default for DensitySetting {
    fn default() -> Self {
        DensitySetting::Fixed(1)
    }
}

impl fmt::Display for DensitySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DensitySetting::Auto => f.write_str("auto"),
            DensitySetting::Fixed(value) => write!(f, "{value}"),
        }
    }
}

impl std::str::FromStr for DensitySetting {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "auto" | "fit" => Ok(DensitySetting::Auto),
            other => other
                .parse::<u32>()
                .map(DensitySetting::Fixed)
                .map_err(|_| format!("invalid pixel density '{other}'; expected an integer or 'auto'")),
        }
    }
}

impl<'de> Deserialize<'de> for DensitySetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Str(String),
            Num(i64),
        }

        match Helper::deserialize(deserializer)? {
            Helper::Str(raw) => raw.parse().map_err(de::Error::custom),
            Helper::Num(value) => u32::try_from(value)
                .map(DensitySetting::Fixed)
                .map_err(|_| de::Error::custom("pixel density must be a non-negative integer")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingModeSetting {
    #[default]
    User,
    Environment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormatSetting {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPowerSetting {
    #[default]
    Low,
    High,
}

/// Effect settings applied at start-up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub orientation: OrientationSetting,
    pub pixel_density: DensitySetting,
    pub target_height: u32,
    pub interlaced: bool,
    pub field: FieldSetting,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            orientation: OrientationSetting::default(),
            pixel_density: DensitySetting::default(),
            target_height: DEFAULT_TARGET_HEIGHT,
            interlaced: false,
            field: FieldSetting::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub facing_mode: FacingModeSetting,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    /// Pacing of image-sequence sources when no frame rate is requested.
    #[serde(deserialize_with = "deserialize_duration")]
    pub frame_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub first_frame_timeout: Duration,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            facing_mode: FacingModeSetting::default(),
            width: None,
            height: None,
            frame_rate: None,
            frame_interval: Duration::from_millis(33),
            first_frame_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub format: ExportFormatSetting,
    pub quality: f32,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            format: ExportFormatSetting::default(),
            quality: DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GpuSection {
    pub power: GpuPowerSetting,
    pub force_fallback_adapter: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrtConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub gpu: GpuSection,
}

impl Default for CrtConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            defaults: Defaults::default(),
            camera: CameraSection::default(),
            export: ExportSection::default(),
            gpu: GpuSection::default(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl CrtConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CrtConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if self.defaults.target_height == 0 {
            return Err(ConfigError::Invalid(
                "defaults.target_height must be greater than zero".into(),
            ));
        }

        if self.defaults.pixel_density == DensitySetting::Fixed(0) {
            return Err(ConfigError::Invalid(
                "defaults.pixel_density must be at least 1 or 'auto'".into(),
            ));
        }

        for (name, value) in [("width", self.camera.width), ("height", self.camera.height)] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "camera.{name} must be greater than zero"
                )));
            }
        }

        if let Some(rate) = self.camera.frame_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::Invalid(
                    "camera.frame_rate must be greater than zero".into(),
                ));
            }
            if Duration::try_from_secs_f64(1.0 / rate as f64).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "camera.frame_rate {rate} is too small for a frame interval"
                )));
            }
        }

        if self.camera.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "camera.frame_interval must be greater than zero".into(),
            ));
        }

        if self.camera.first_frame_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "camera.first_frame_timeout must be greater than zero".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.export.quality) {
            return Err(ConfigError::Invalid(format!(
                "export.quality must be within 0..=1, got {}",
                self.export.quality
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
version = 1

[defaults]
orientation = "rows"
pixel_density = "auto"
target_height = 240
interlaced = true
field = "even"

[camera]
facing_mode = "environment"
width = 640
height = 480
frame_rate = 30
frame_interval = "40ms"
first_frame_timeout = 3

[export]
format = "jpg"
quality = 0.8

[gpu]
power = "high"
force_fallback_adapter = true
"#;

    #[test]
    fn parses_sample_config() {
        let config = CrtConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.defaults.orientation, OrientationSetting::Rows);
        assert_eq!(config.defaults.pixel_density, DensitySetting::Auto);
        assert_eq!(config.defaults.target_height, 240);
        assert!(config.defaults.interlaced);
        assert_eq!(config.defaults.field, FieldSetting::Even);
        assert_eq!(config.camera.facing_mode, FacingModeSetting::Environment);
        assert_eq!(config.camera.frame_rate, Some(30.0));
        assert_eq!(config.camera.frame_interval, Duration::from_millis(40));
        assert_eq!(config.camera.first_frame_timeout, Duration::from_secs(3));
        assert_eq!(config.export.format, ExportFormatSetting::Jpeg);
        assert_eq!(config.gpu.power, GpuPowerSetting::High);
        assert!(config.gpu.force_fallback_adapter);
    }

    #[test]
    fn omitted_sections_use_defaults() {
        let config = CrtConfig::from_toml_str("version = 1\n").unwrap();
        assert_eq!(config, CrtConfig::default());
        assert_eq!(config.defaults.pixel_density, DensitySetting::Fixed(1));
        assert_eq!(config.defaults.target_height, 480);
        assert_eq!(config.export.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn numeric_density_is_fixed() {
        let config = CrtConfig::from_toml_str(
            r#"
version = 1

[defaults]
pixel_density = 4
"#,
        )
        .unwrap();
        assert_eq!(config.defaults.pixel_density, DensitySetting::Fixed(4));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = CrtConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for body in [
            "[defaults]\npixel_density = 0\n",
            "[defaults]\ntarget_height = 0\n",
            "[camera]\nwidth = 0\n",
            "[camera]\nframe_rate = 0\n",
            "[camera]\nframe_rate = 1e-30\n",
            "[camera]\nframe_interval = \"0s\"\n",
            "[export]\nquality = 1.5\n",
        ] {
            let err = CrtConfig::from_toml_str(&format!("version = 1\n{body}")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "accepted {body:?}");
        }
    }

    #[test]
    fn rejects_malformed_density() {
        let err = CrtConfig::from_toml_str(
            r#"
version = 1

[defaults]
pixel_density = "dense"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CrtConfig::load(&dir.path().join("crtpix.toml")).unwrap();
        assert_eq!(config, CrtConfig::default());
    }

    #[test]
    fn load_reads_and_validates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crtpix.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(
            CrtConfig::load(&path).unwrap().defaults.target_height,
            240
        );

        std::fs::write(&path, "version = 1\n[export]\nquality = -1\n").unwrap();
        assert!(matches!(
            CrtConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}

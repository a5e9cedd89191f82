use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    #[default]
    High,
}

/// Fidelity knobs shared by every preview kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSettings {
    pub min_pixel_ratio: f32,
    pub max_pixel_ratio: f32,
    pub antialias: bool,
    pub power: PowerSetting,
}

impl ProfileSettings {
    pub const FULL: Self = Self {
        min_pixel_ratio: 1.0,
        max_pixel_ratio: 2.0,
        antialias: true,
        power: PowerSetting::High,
    };

    pub const REDUCED: Self = Self {
        min_pixel_ratio: 0.5,
        max_pixel_ratio: 1.0,
        antialias: false,
        power: PowerSetting::Low,
    };
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub hover: HoverConfig,
    #[serde(default)]
    pub inline: PreviewConfig,
    #[serde(default)]
    pub hero: PreviewConfig,
    #[serde(default)]
    pub modal: ModalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoverConfig {
    #[serde(
        default = "default_hover_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub delay: Duration,
    #[serde(default = "reduced_min_ratio")]
    pub min_pixel_ratio: f32,
    #[serde(default = "reduced_max_ratio")]
    pub max_pixel_ratio: f32,
    #[serde(default, deserialize_with = "deserialize_antialias")]
    pub antialias: bool,
    #[serde(default = "low_power")]
    pub power: PowerSetting,
}

/// Inline (detail page, expanded tile) and hero previews.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    #[serde(default = "full_min_ratio")]
    pub min_pixel_ratio: f32,
    #[serde(default = "full_max_ratio")]
    pub max_pixel_ratio: f32,
    #[serde(default = "enabled", deserialize_with = "deserialize_antialias")]
    pub antialias: bool,
    #[serde(default)]
    pub power: PowerSetting,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModalConfig {
    #[serde(
        default = "default_close_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub close_delay: Duration,
    #[serde(default = "full_min_ratio")]
    pub min_pixel_ratio: f32,
    #[serde(default = "full_max_ratio")]
    pub max_pixel_ratio: f32,
    #[serde(default = "enabled", deserialize_with = "deserialize_antialias")]
    pub antialias: bool,
    #[serde(default)]
    pub power: PowerSetting,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            hover: HoverConfig::default(),
            inline: PreviewConfig::default(),
            hero: PreviewConfig::default(),
            modal: ModalConfig::default(),
        }
    }
}

impl Default for HoverConfig {
    fn default() -> Self {
        let profile = ProfileSettings::REDUCED;
        Self {
            delay: default_hover_delay(),
            min_pixel_ratio: profile.min_pixel_ratio,
            max_pixel_ratio: profile.max_pixel_ratio,
            antialias: profile.antialias,
            power: profile.power,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let profile = ProfileSettings::FULL;
        Self {
            min_pixel_ratio: profile.min_pixel_ratio,
            max_pixel_ratio: profile.max_pixel_ratio,
            antialias: profile.antialias,
            power: profile.power,
        }
    }
}

impl Default for ModalConfig {
    fn default() -> Self {
        let profile = ProfileSettings::FULL;
        Self {
            close_delay: default_close_delay(),
            min_pixel_ratio: profile.min_pixel_ratio,
            max_pixel_ratio: profile.max_pixel_ratio,
            antialias: profile.antialias,
            power: profile.power,
        }
    }
}

impl HoverConfig {
    pub fn profile(&self) -> ProfileSettings {
        ProfileSettings {
            min_pixel_ratio: self.min_pixel_ratio,
            max_pixel_ratio: self.max_pixel_ratio,
            antialias: self.antialias,
            power: self.power,
        }
    }
}

impl PreviewConfig {
    pub fn profile(&self) -> ProfileSettings {
        ProfileSettings {
            min_pixel_ratio: self.min_pixel_ratio,
            max_pixel_ratio: self.max_pixel_ratio,
            antialias: self.antialias,
            power: self.power,
        }
    }
}

impl ModalConfig {
    pub fn profile(&self) -> ProfileSettings {
        ProfileSettings {
            min_pixel_ratio: self.min_pixel_ratio,
            max_pixel_ratio: self.max_pixel_ratio,
            antialias: self.antialias,
            power: self.power,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_hover_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_close_delay() -> Duration {
    Duration::from_millis(300)
}

fn reduced_min_ratio() -> f32 {
    ProfileSettings::REDUCED.min_pixel_ratio
}

fn reduced_max_ratio() -> f32 {
    ProfileSettings::REDUCED.max_pixel_ratio
}

fn full_min_ratio() -> f32 {
    ProfileSettings::FULL.min_pixel_ratio
}

fn full_max_ratio() -> f32 {
    ProfileSettings::FULL.max_pixel_ratio
}

fn low_power() -> PowerSetting {
    PowerSetting::Low
}

fn enabled() -> bool {
    true
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
            Duration::try_from_secs_f64(v).map_err(|_| E::custom("duration out of range"))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_antialias<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Bool(bool),
        Str(String),
        Num(i64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Bool(value) => Ok(value),
        Helper::Str(raw) => parse_antialias(&raw).map_err(de::Error::custom),
        Helper::Num(value) if value < 0 => Err(de::Error::custom(
            "antialias value must be non-negative",
        )),
        Helper::Num(value) => Ok(value > 1),
    }
}

fn parse_antialias(raw: &str) -> Result<bool, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "on" | "default" | "enabled" => Ok(true),
        "off" | "none" | "disable" | "disabled" => Ok(false),
        other => Err(format!("invalid antialias setting '{other}'")),
    }
}

impl SessionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SessionConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        validate_profile("hover", &self.hover.profile())?;
        validate_profile("inline", &self.inline.profile())?;
        validate_profile("hero", &self.hero.profile())?;
        validate_profile("modal", &self.modal.profile())?;

        if self.hover.delay > Duration::from_secs(10) {
            return Err(ConfigError::Invalid(
                "hover.delay must not exceed 10s".into(),
            ));
        }

        if self.modal.close_delay > Duration::from_secs(10) {
            return Err(ConfigError::Invalid(
                "modal.close_delay must not exceed 10s".into(),
            ));
        }

        Ok(())
    }
}

fn validate_profile(section: &str, profile: &ProfileSettings) -> Result<(), ConfigError> {
    let ProfileSettings {
        min_pixel_ratio: min,
        max_pixel_ratio: max,
        ..
    } = *profile;
    if !(min.is_finite() && min > 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{section}.min_pixel_ratio must be greater than zero"
        )));
    }
    if !(max.is_finite() && max > 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{section}.max_pixel_ratio must be greater than zero"
        )));
    }
    if min > max {
        return Err(ConfigError::Invalid(format!(
            "{section}.min_pixel_ratio ({min}) exceeds max_pixel_ratio ({max})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[hover]
delay = "450ms"
max_pixel_ratio = 0.75
antialias = "off"

[inline]
antialias = 4

[hero]
power = "low"

[modal]
close_delay = 0.5
"#;

    #[test]
    fn parses_sample_config() {
        let config = SessionConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.hover.delay, Duration::from_millis(450));
        assert_eq!(config.hover.min_pixel_ratio, 0.5);
        assert_eq!(config.hover.max_pixel_ratio, 0.75);
        assert!(!config.hover.antialias);
        assert_eq!(config.hover.power, PowerSetting::Low);
        assert!(config.inline.antialias);
        assert_eq!(config.hero.power, PowerSetting::Low);
        assert_eq!(config.modal.close_delay, Duration::from_millis(500));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.hover.delay, Duration::from_millis(300));
        assert_eq!(config.hover.profile(), ProfileSettings::REDUCED);
        assert_eq!(config.inline.profile(), ProfileSettings::FULL);
        assert_eq!(config.modal.close_delay, Duration::from_millis(300));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_pixel_ratio_range() {
        let err = SessionConfig::from_toml_str(
            r#"
[hover]
min_pixel_ratio = 2.0
max_pixel_ratio = 1.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_positive_ratio_and_bad_version() {
        let err = SessionConfig::from_toml_str("[modal]\nmin_pixel_ratio = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = SessionConfig::from_toml_str("version = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_durations() {
        assert!(matches!(
            SessionConfig::from_toml_str("[hover]\nwait = 1\n").unwrap_err(),
            ConfigError::Parse(_)
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("[hover]\ndelay = \"soon\"\n").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn rejects_out_of_range_numeric_duration() {
        let huge = "version = 1\n[modal]\nclose_delay = 1e300\n";
        let err = SessionConfig::from_toml_str(huge).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let quarter = "version = 1\n[modal]\nclose_delay = 0.25\n";
        let config = SessionConfig::from_toml_str(quarter).unwrap();
        assert_eq!(config.modal.close_delay, Duration::from_millis(250));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.hover.delay, Duration::from_millis(450));
        assert!(matches!(
            SessionConfig::load(dir.path().join("missing.toml")).unwrap_err(),
            ConfigError::Io(_)
        ));
    }
}

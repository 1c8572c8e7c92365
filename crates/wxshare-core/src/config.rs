use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Module name the shared producer registers under unless configured otherwise.
pub const DEFAULT_ENDPOINT_NAME: &str = "wxshare-producer";

/// Backend identifiers `producer.weather_provider` may name.
pub const SUPPORTED_PROVIDERS: &[&str] = &["openmeteo"];

/// Environment overrides look like `WXSHARE__SCHEDULER__TYPE=current`.
const ENV_PREFIX: &str = "WXSHARE";

const ONE_DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Which categories a scheduler (or a widget) cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleType {
    Current,
    Forecast,
    /// Same as `Forecast`.
    Daily,
    Hourly,
    /// Current and forecast weather plus both pollution categories.
    Full,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::Full => "full",
        }
    }
}

impl FromStr for ScheduleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "current" => Ok(Self::Current),
            "forecast" => Ok(Self::Forecast),
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "full" => Ok(Self::Full),
            other => Err(ConfigError::UnknownType(other.to_string())),
        }
    }
}

/// A refresh period read leniently from configuration.
///
/// Zero, negative, null, NaN and missing values all mean "disabled".
/// Anything that is not a number at all is kept as `Malformed` so
/// validation can report it; it is never armed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IntervalSetting {
    #[default]
    Disabled,
    Every(u64),
    Malformed(String),
}

impl IntervalSetting {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::Disabled
        } else {
            Self::Every(ms)
        }
    }

    fn from_signed(ms: i64) -> Self {
        u64::try_from(ms).map_or(Self::Disabled, Self::from_millis)
    }

    fn from_float(ms: f64) -> Self {
        if ms.is_nan() || ms < 1.0 {
            Self::Disabled
        } else if ms.is_infinite() {
            Self::Malformed(ms.to_string())
        } else {
            Self::Every(ms.round() as u64)
        }
    }

    fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("null") {
            return Self::Disabled;
        }
        if let Ok(ms) = text.parse::<i64>() {
            return Self::from_signed(ms);
        }
        match text.parse::<f64>() {
            Ok(ms) => Self::from_float(ms),
            Err(_) => Self::Malformed(text.to_string()),
        }
    }

    /// The period, if this interval should arm a timer.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Every(ms) => Some(Duration::from_millis(*ms)),
            Self::Disabled | Self::Malformed(_) => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Every(_))
    }
}

impl<'de> Deserialize<'de> for IntervalSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Self::Disabled,
            Some(Raw::Int(ms)) => Self::from_signed(ms),
            Some(Raw::Float(ms)) => Self::from_float(ms),
            Some(Raw::Text(text)) => Self::from_text(&text),
        })
    }
}

impl Serialize for IntervalSetting {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Every(ms) => serializer.serialize_u64(*ms),
            Self::Disabled => serializer.serialize_u64(0),
            Self::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

/// Timer settings for the shared producer.
///
/// A missing `[scheduler]` table gets [`SchedulerConfig::default`], with every
/// interval enabled. Inside a table that is present, an omitted
/// `update_interval_*` key means that category is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before the first fetch of every category; `None` (written as -1)
    /// waits one full interval.
    #[serde(
        default = "default_initial_load_delay",
        deserialize_with = "deserialize_initial_delay",
        serialize_with = "serialize_initial_delay"
    )]
    pub initial_load_delay_ms: Option<u64>,

    #[serde(default)]
    pub update_interval_current_weather_ms: IntervalSetting,

    #[serde(default)]
    pub update_interval_forecast_weather_ms: IntervalSetting,

    #[serde(default)]
    pub update_interval_current_pollution_ms: IntervalSetting,

    #[serde(default)]
    pub update_interval_forecast_pollution_ms: IntervalSetting,

    /// One of `current`, `forecast`, `daily`, `hourly`, `full`
    #[serde(rename = "type", default = "default_schedule_type")]
    pub schedule_type: String,
}

fn default_initial_load_delay() -> Option<u64> {
    Some(0)
}

fn serialize_initial_delay<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ms) => serializer.serialize_u64(*ms),
        None => serializer.serialize_i64(-1),
    }
}

fn deserialize_initial_delay<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.and_then(|ms| u64::try_from(ms).ok()))
}

fn default_schedule_type() -> String {
    ScheduleType::Full.as_str().to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_load_delay_ms: default_initial_load_delay(),
            update_interval_current_weather_ms: IntervalSetting::Every(2 * 60 * 1000),
            update_interval_forecast_weather_ms: IntervalSetting::Every(15 * 60 * 1000),
            update_interval_current_pollution_ms: IntervalSetting::Every(8 * 60 * 60 * 1000),
            update_interval_forecast_pollution_ms: IntervalSetting::Every(30 * 60 * 1000),
            schedule_type: default_schedule_type(),
        }
    }
}

impl SchedulerConfig {
    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_load_delay_ms.map(Duration::from_millis)
    }

    pub fn schedule_type(&self) -> Result<ScheduleType, ConfigError> {
        self.schedule_type.parse()
    }

    fn intervals(&self) -> [(&'static str, &IntervalSetting); 4] {
        [
            (
                "scheduler.update_interval_current_weather_ms",
                &self.update_interval_current_weather_ms,
            ),
            (
                "scheduler.update_interval_forecast_weather_ms",
                &self.update_interval_forecast_weather_ms,
            ),
            (
                "scheduler.update_interval_current_pollution_ms",
                &self.update_interval_current_pollution_ms,
            ),
            (
                "scheduler.update_interval_forecast_pollution_ms",
                &self.update_interval_forecast_pollution_ms,
            ),
        ]
    }
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// The shared producer: which backend it talks to and the name it registers under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Name readers put in their `weather_endpoint`
    #[serde(default = "default_endpoint_name")]
    pub name: String,

    /// Disambiguator when several producers share a name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_endpoint_id: Option<String>,

    /// Backend identifier, see [`SUPPORTED_PROVIDERS`]
    #[serde(default = "default_weather_provider")]
    pub weather_provider: String,

    #[serde(default = "default_forecast_url")]
    pub base_url: String,

    #[serde(default = "default_air_quality_url")]
    pub air_quality_url: String,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
}

fn default_endpoint_name() -> String {
    DEFAULT_ENDPOINT_NAME.to_string()
}

fn default_weather_provider() -> String {
    "openmeteo".to_string()
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_air_quality_url() -> String {
    "https://air-quality-api.open-meteo.com/v1/air-quality".to_string()
}

fn default_latitude() -> f64 {
    48.8566
}

fn default_longitude() -> f64 {
    2.3522
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            name: default_endpoint_name(),
            weather_endpoint_id: None,
            weather_provider: default_weather_provider(),
            base_url: default_forecast_url(),
            air_quality_url: default_air_quality_url(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            temperature_unit: TemperatureUnit::default(),
        }
    }
}

/// A display widget that reads through a proxy instead of polling itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub name: String,

    #[serde(default = "default_endpoint_name")]
    pub weather_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_endpoint_id: Option<String>,

    #[serde(rename = "type", default = "default_widget_type")]
    pub widget_type: String,

    /// How often the widget pulls from its proxy
    #[serde(default = "default_widget_refresh_ms")]
    pub refresh_ms: u64,
}

fn default_widget_type() -> String {
    ScheduleType::Current.as_str().to_string()
}

fn default_widget_refresh_ms() -> u64 {
    60 * 1000
}

impl WidgetConfig {
    pub fn new(name: impl Into<String>, widget_type: ScheduleType) -> Self {
        Self {
            name: name.into(),
            weather_endpoint: default_endpoint_name(),
            weather_endpoint_id: None,
            widget_type: widget_type.as_str().to_string(),
            refresh_ms: default_widget_refresh_ms(),
        }
    }

    pub fn widget_type(&self) -> Result<ScheduleType, ConfigError> {
        self.widget_type.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub producer: ProducerConfig,

    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            producer: ProducerConfig::default(),
            widgets: vec![
                WidgetConfig::new("current-conditions", ScheduleType::Current),
                WidgetConfig::new("forecast-panel", ScheduleType::Forecast),
            ],
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
        }

        Self::load_from(&config_path)
    }

    /// Load a TOML file, then apply `WXSHARE__SECTION__KEY` environment overrides
    ///
    /// Failures carry a [`ConfigError`]: `NotFound` for a missing file,
    /// `ParseError` for anything the file or overrides cannot be read as.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and report validation problems
    ///
    /// Configuration errors are not fatal here: the affected schedule or
    /// widget degrades to disabled, so everything is logged and the config is
    /// returned alongside the findings.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        for error in &validation.errors {
            tracing::error!("Config error: {}", error);
        }
        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Err(e) = self.scheduler.schedule_type() {
            result.add_error("scheduler.type", e.to_string());
        }

        let mut any_enabled = false;
        for (field, interval) in self.scheduler.intervals() {
            match interval {
                IntervalSetting::Malformed(raw) => {
                    result.add_error(field, format!("Not a number of milliseconds: {}", raw));
                }
                IntervalSetting::Every(ms) if *ms > ONE_DAY_MS => {
                    any_enabled = true;
                    result.add_warning(field, "Refresh interval is more than 24 hours");
                }
                IntervalSetting::Every(_) => any_enabled = true,
                IntervalSetting::Disabled => {}
            }
        }
        if !any_enabled {
            result.add_warning("scheduler", "Every update interval is disabled; nothing will be fetched");
        }

        if self.producer.name.trim().is_empty() {
            result.add_error("producer.name", "Producer name must not be empty");
        }

        if !SUPPORTED_PROVIDERS.contains(&self.producer.weather_provider.as_str()) {
            result.add_error(
                "producer.weather_provider",
                ConfigError::UnknownProvider(self.producer.weather_provider.clone()).to_string(),
            );
        }

        self.validate_url(&self.producer.base_url, "producer.base_url", &mut result);
        self.validate_url(
            &self.producer.air_quality_url,
            "producer.air_quality_url",
            &mut result,
        );

        if !(-90.0..=90.0).contains(&self.producer.latitude) {
            result.add_error("producer.latitude", "Latitude must be between -90 and 90");
        }
        if !(-180.0..=180.0).contains(&self.producer.longitude) {
            result.add_error("producer.longitude", "Longitude must be between -180 and 180");
        }

        for (i, widget) in self.widgets.iter().enumerate() {
            let field = format!("widgets[{}]", i);

            if let Err(e) = widget.widget_type() {
                result.add_error(format!("{}.type", field), e.to_string());
            }

            if widget.refresh_ms == 0 {
                result.add_warning(
                    format!("{}.refresh_ms", field),
                    format!("Widget '{}' refresh disabled (0 ms)", widget.name),
                );
            }

            if widget.weather_endpoint != self.producer.name {
                result.add_warning(
                    format!("{}.weather_endpoint", field),
                    format!(
                        "Widget '{}' reads from '{}', which this process does not produce",
                        widget.name, widget.weather_endpoint
                    ),
                );
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wxshare");

        Ok(config_dir.join("config.toml"))
    }
}

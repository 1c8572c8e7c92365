use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use wxshare_core::{ConfigError, ProducerConfig};

use crate::cache::{UpdateEvent, WeatherCache};
use crate::openmeteo::OpenMeteoProvider;
use crate::types::{AirQuality, Category, CurrentWeather, DayForecast, HourlyForecast, WeatherError};

/// Upper bound a producer puts on a single HTTP fetch.
///
/// The scheduler never cancels a fetch itself; producers apply this to
/// their own clients.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional fetch entry points a producer supports.
///
/// The scheduler branches on these flags instead of probing the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `fetch_weather_all` fills current, hourly and daily in one request
    pub combined_fetch: bool,
    pub hourly: bool,
    pub current_pollution: bool,
    pub forecast_pollution: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            combined_fetch: true,
            hourly: true,
            current_pollution: true,
            forecast_pollution: true,
        }
    }
}

/// A component that refreshes weather datasets and exposes the latest ones.
///
/// Fetch methods trigger work and store their result in the producer's
/// [`WeatherCache`]; read methods only return what is already cached.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Human-readable provider name, used in logs
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Where this producer keeps its latest datasets
    fn cache(&self) -> &WeatherCache;

    async fn fetch_current_weather(&self) -> Result<(), WeatherError>;

    async fn fetch_weather_forecast(&self) -> Result<(), WeatherError>;

    async fn fetch_weather_hourly(&self) -> Result<(), WeatherError>;

    async fn fetch_current_pollution(&self) -> Result<(), WeatherError> {
        Err(WeatherError::Unsupported("current pollution"))
    }

    async fn fetch_pollution_forecast(&self) -> Result<(), WeatherError> {
        Err(WeatherError::Unsupported("pollution forecast"))
    }

    async fn fetch_weather_all(&self) -> Result<(), WeatherError> {
        Err(WeatherError::Unsupported("combined fetch"))
    }

    /// Trigger the fetch entry point for one category.
    async fn fetch(&self, category: Category) -> Result<(), WeatherError> {
        match category {
            Category::Current => self.fetch_current_weather().await,
            Category::Forecast => self.fetch_weather_forecast().await,
            Category::Hourly => self.fetch_weather_hourly().await,
            Category::CurrentPollution => self.fetch_current_pollution().await,
            Category::ForecastPollution => self.fetch_pollution_forecast().await,
        }
    }

    fn current_weather(&self) -> Option<Arc<CurrentWeather>> {
        self.cache().current_weather()
    }

    fn weather_forecast(&self) -> Option<Arc<Vec<DayForecast>>> {
        self.cache().weather_forecast()
    }

    fn weather_hourly(&self) -> Option<Arc<Vec<HourlyForecast>>> {
        self.cache().weather_hourly()
    }

    fn current_pollution(&self) -> Option<Arc<AirQuality>> {
        self.cache().current_pollution()
    }

    fn pollution_forecast(&self) -> Option<Arc<Vec<AirQuality>>> {
        self.cache().pollution_forecast()
    }

    /// Notified each time a fresh value is stored.
    fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.cache().subscribe()
    }
}

/// Build the backend producer named by `config.weather_provider`.
pub fn create_provider(config: &ProducerConfig) -> Result<Arc<dyn WeatherProvider>, ConfigError> {
    match config.weather_provider.to_ascii_lowercase().as_str() {
        "openmeteo" => {
            let provider = OpenMeteoProvider::from_config(config)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            tracing::info!(
                "Created {} producer for ({}, {})",
                provider.name(),
                config.latitude,
                config.longitude
            );
            Ok(Arc::new(provider))
        }
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

//! A producer that never fetches.
//!
//! `ProxyWeatherProvider` answers the same calls as any producer, but each
//! fetch only copies the latest dataset from a shared producer found in the
//! [`ProviderDirectory`]. Many widgets can each hold a proxy while one
//! producer does the network work.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use wxshare_core::{WidgetConfig, DEFAULT_ENDPOINT_NAME};

use crate::cache::WeatherCache;
use crate::provider::{Capabilities, WeatherProvider};
use crate::registry::ProviderDirectory;
use crate::types::WeatherError;

/// Which shared producer a proxy reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Registered name of the producer
    pub weather_endpoint: String,
    /// Picks one producer when several share the name
    pub weather_endpoint_id: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            weather_endpoint: DEFAULT_ENDPOINT_NAME.to_string(),
            weather_endpoint_id: None,
        }
    }
}

impl From<&WidgetConfig> for ProxyConfig {
    fn from(widget: &WidgetConfig) -> Self {
        Self {
            weather_endpoint: widget.weather_endpoint.clone(),
            weather_endpoint_id: widget.weather_endpoint_id.clone(),
        }
    }
}

pub struct ProxyWeatherProvider {
    config: ProxyConfig,
    directory: Arc<ProviderDirectory>,
    binding: Mutex<Option<Arc<dyn WeatherProvider>>>,
    cache: WeatherCache,
}

impl ProxyWeatherProvider {
    pub fn new(config: ProxyConfig, directory: Arc<ProviderDirectory>) -> Self {
        Self {
            config,
            directory,
            binding: Mutex::new(None),
            cache: WeatherCache::new(),
        }
    }

    /// The shared producer, looked up on first use and remembered after that.
    ///
    /// Returns `None` (after logging why) while no unique producer matches.
    pub fn resolve_producer(&self) -> Option<Arc<dyn WeatherProvider>> {
        let mut binding = self.binding.lock();
        if let Some(producer) = binding.as_ref() {
            return Some(Arc::clone(producer));
        }

        match self.directory.resolve(
            &self.config.weather_endpoint,
            self.config.weather_endpoint_id.as_deref(),
        ) {
            Ok(producer) => {
                tracing::info!(
                    "Proxy bound to {} ({})",
                    self.config.weather_endpoint,
                    producer.name()
                );
                *binding = Some(Arc::clone(&producer));
                Some(producer)
            }
            Err(e) => {
                tracing::error!("{}", e);
                None
            }
        }
    }

    /// Forget the bound producer; the next read resolves again.
    pub fn clear_binding(&self) {
        if self.binding.lock().take().is_some() {
            tracing::debug!("Proxy for {} unbound", self.config.weather_endpoint);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

#[async_trait]
impl WeatherProvider for ProxyWeatherProvider {
    fn name(&self) -> &str {
        "ProxyWeatherProvider"
    }

    /// Every read entry point is available; there is no combined fetch to forward.
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            combined_fetch: false,
            hourly: true,
            current_pollution: true,
            forecast_pollution: true,
        }
    }

    fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    async fn fetch_current_weather(&self) -> Result<(), WeatherError> {
        if let Some(producer) = self.resolve_producer() {
            self.cache.set_current_weather(producer.current_weather());
        }
        Ok(())
    }

    async fn fetch_weather_forecast(&self) -> Result<(), WeatherError> {
        if let Some(producer) = self.resolve_producer() {
            self.cache.set_weather_forecast(producer.weather_forecast());
        }
        Ok(())
    }

    async fn fetch_weather_hourly(&self) -> Result<(), WeatherError> {
        if let Some(producer) = self.resolve_producer() {
            self.cache.set_weather_hourly(producer.weather_hourly());
        }
        Ok(())
    }

    async fn fetch_current_pollution(&self) -> Result<(), WeatherError> {
        if let Some(producer) = self.resolve_producer() {
            self.cache.set_current_pollution(producer.current_pollution());
        }
        Ok(())
    }

    async fn fetch_pollution_forecast(&self) -> Result<(), WeatherError> {
        if let Some(producer) = self.resolve_producer() {
            self.cache.set_pollution_forecast(producer.pollution_forecast());
        }
        Ok(())
    }
}

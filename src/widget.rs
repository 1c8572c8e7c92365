//! Consumer side of the daemon: one refresh loop per configured widget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use wxshare_core::{ScheduleType, WidgetConfig};
use wxshare_weather::{Category, ProxyWeatherProvider, WeatherProvider};

/// Categories a widget of the given type displays.
pub fn categories_for(widget_type: ScheduleType) -> &'static [Category] {
    match widget_type {
        ScheduleType::Current => &[Category::Current],
        ScheduleType::Forecast => &[Category::Forecast, Category::Hourly],
        ScheduleType::Daily => &[Category::Forecast],
        ScheduleType::Hourly => &[Category::Hourly],
        ScheduleType::Full => &Category::ALL,
    }
}

pub struct Widget {
    name: String,
    categories: &'static [Category],
    /// `None` when `refresh_ms` is 0: the widget never pulls
    refresh: Option<Duration>,
    proxy: Arc<ProxyWeatherProvider>,
}

impl Widget {
    pub fn new(config: &WidgetConfig, proxy: Arc<ProxyWeatherProvider>) -> anyhow::Result<Self> {
        let widget_type = config.widget_type()?;
        Ok(Self {
            name: config.name.clone(),
            categories: categories_for(widget_type),
            refresh: (config.refresh_ms > 0).then(|| Duration::from_millis(config.refresh_ms)),
            proxy,
        })
    }

    pub fn refresh(&self) -> Option<Duration> {
        self.refresh
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pull from the proxy every refresh period and log what changed until cancelled.
    ///
    /// Returns at once when refresh is disabled.
    pub async fn run(self, cancel: CancellationToken) {
        let Some(period) = self.refresh else {
            tracing::info!("Widget {} refresh disabled", self.name);
            return;
        };
        let mut updates = self.proxy.subscribe();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Widget {} reading {:?} from {} every {:?}",
            self.name,
            self.categories,
            self.proxy.config().weather_endpoint,
            period
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.refresh_all().await,
                update = updates.recv() => match update {
                    Ok(event) => self.show(event.category),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Widget {} missed {} updates", self.name, missed);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        tracing::debug!("Widget {} stopped", self.name);
    }

    async fn refresh_all(&self) {
        for &category in self.categories {
            if let Err(e) = self.proxy.fetch(category).await {
                tracing::warn!("Widget {} could not read {}: {}", self.name, category, e);
            }
        }
    }

    fn show(&self, category: Category) {
        if !self.categories.contains(&category) {
            return;
        }
        let Some(summary) = summarize(self.proxy.as_ref(), category) else {
            tracing::debug!("Widget {}: no {} data yet", self.name, category);
            return;
        };
        tracing::info!("[{}] {}", self.name, summary);
    }
}

/// One-line description of what a reader currently holds for `category`.
pub fn summarize(reader: &dyn WeatherProvider, category: Category) -> Option<String> {
    match category {
        Category::Current => reader.current_weather().map(|w| {
            format!(
                "{:.1}° (feels {:.1}°), {}, humidity {}%, wind {:.0} km/h",
                w.temperature,
                w.feels_like,
                w.condition.description(),
                w.humidity,
                w.wind_speed
            )
        }),
        Category::Forecast => reader.weather_forecast().and_then(|days| {
            days.first().map(|today| {
                format!(
                    "{} days, today {:.0}°/{:.0}° {}",
                    days.len(),
                    today.high,
                    today.low,
                    today.condition.description()
                )
            })
        }),
        Category::Hourly => reader.weather_hourly().map(|hours| {
            match hours.first() {
                Some(next) => format!(
                    "{} hours, next {:.1}° {} ({}% rain)",
                    hours.len(),
                    next.temperature,
                    next.condition.description(),
                    next.precipitation_chance
                ),
                None => "no hourly data".to_string(),
            }
        }),
        Category::CurrentPollution => reader.current_pollution().map(|air| match air.level() {
            Some(level) => format!("air quality {:?} (AQI {})", level, air.european_aqi.unwrap_or(0)),
            None => "air quality unknown".to_string(),
        }),
        Category::ForecastPollution => reader
            .pollution_forecast()
            .map(|samples| format!("{} air quality samples", samples.len())),
    }
}

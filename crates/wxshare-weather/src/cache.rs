//! Latest-value slots held by every producer.
//!
//! Each category keeps only its most recent dataset. A store replaces the
//! whole slot under the write lock and then announces the category on the
//! update channel, so readers never observe a partially written record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::types::{AirQuality, Category, CurrentWeather, DayForecast, HourlyForecast};

const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Sent to subscribers whenever a fresh value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateEvent {
    pub category: Category,
}

#[derive(Debug, Default)]
struct Slots {
    current: Option<Arc<CurrentWeather>>,
    forecast: Option<Arc<Vec<DayForecast>>>,
    hourly: Option<Arc<Vec<HourlyForecast>>>,
    current_pollution: Option<Arc<AirQuality>>,
    pollution_forecast: Option<Arc<Vec<AirQuality>>>,
    stored_at: [Option<DateTime<Utc>>; 5],
}

impl Slots {
    fn touch(&mut self, category: Category) {
        self.stored_at[slot_index(category)] = Some(Utc::now());
    }
}

fn slot_index(category: Category) -> usize {
    match category {
        Category::Current => 0,
        Category::Forecast => 1,
        Category::Hourly => 2,
        Category::CurrentPollution => 3,
        Category::ForecastPollution => 4,
    }
}

#[derive(Debug)]
pub struct WeatherCache {
    slots: RwLock<Slots>,
    updates: broadcast::Sender<UpdateEvent>,
}

impl Default for WeatherCache {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            slots: RwLock::new(Slots::default()),
            updates,
        }
    }

    /// Receive an [`UpdateEvent`] for every store made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.updates.subscribe()
    }

    pub fn current_weather(&self) -> Option<Arc<CurrentWeather>> {
        self.slots.read().current.clone()
    }

    pub fn weather_forecast(&self) -> Option<Arc<Vec<DayForecast>>> {
        self.slots.read().forecast.clone()
    }

    pub fn weather_hourly(&self) -> Option<Arc<Vec<HourlyForecast>>> {
        self.slots.read().hourly.clone()
    }

    pub fn current_pollution(&self) -> Option<Arc<AirQuality>> {
        self.slots.read().current_pollution.clone()
    }

    pub fn pollution_forecast(&self) -> Option<Arc<Vec<AirQuality>>> {
        self.slots.read().pollution_forecast.clone()
    }

    /// When the category was last stored, if ever.
    pub fn stored_at(&self, category: Category) -> Option<DateTime<Utc>> {
        self.slots.read().stored_at[slot_index(category)]
    }

    pub fn set_current_weather(&self, value: Option<Arc<CurrentWeather>>) {
        {
            let mut slots = self.slots.write();
            slots.current = value;
            slots.touch(Category::Current);
        }
        self.notify(Category::Current);
    }

    pub fn set_weather_forecast(&self, value: Option<Arc<Vec<DayForecast>>>) {
        {
            let mut slots = self.slots.write();
            slots.forecast = value;
            slots.touch(Category::Forecast);
        }
        self.notify(Category::Forecast);
    }

    pub fn set_weather_hourly(&self, value: Option<Arc<Vec<HourlyForecast>>>) {
        {
            let mut slots = self.slots.write();
            slots.hourly = value;
            slots.touch(Category::Hourly);
        }
        self.notify(Category::Hourly);
    }

    pub fn set_current_pollution(&self, value: Option<Arc<AirQuality>>) {
        {
            let mut slots = self.slots.write();
            slots.current_pollution = value;
            slots.touch(Category::CurrentPollution);
        }
        self.notify(Category::CurrentPollution);
    }

    pub fn set_pollution_forecast(&self, value: Option<Arc<Vec<AirQuality>>>) {
        {
            let mut slots = self.slots.write();
            slots.pollution_forecast = value;
            slots.touch(Category::ForecastPollution);
        }
        self.notify(Category::ForecastPollution);
    }

    /// Store the three weather categories of a combined fetch in one write.
    pub fn set_weather_all(
        &self,
        current: CurrentWeather,
        hourly: Vec<HourlyForecast>,
        forecast: Vec<DayForecast>,
    ) {
        {
            let mut slots = self.slots.write();
            slots.current = Some(Arc::new(current));
            slots.hourly = Some(Arc::new(hourly));
            slots.forecast = Some(Arc::new(forecast));
            slots.touch(Category::Current);
            slots.touch(Category::Hourly);
            slots.touch(Category::Forecast);
        }
        self.notify(Category::Current);
        self.notify(Category::Hourly);
        self.notify(Category::Forecast);
    }

    fn notify(&self, category: Category) {
        tracing::debug!("New {} data available", category);
        if self.updates.send(UpdateEvent { category }).is_err() {
            tracing::trace!("No subscribers for {} updates", category);
        }
    }
}

//! Test producer that records every fetch instead of calling a backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use wxshare_weather::{
    AirQuality, Capabilities, CurrentWeather, DayForecast, FetchOp, HourlyForecast,
    WeatherCache, WeatherCondition, WeatherError, WeatherProvider,
};

pub struct RecordingProvider {
    capabilities: Capabilities,
    cache: WeatherCache,
    origin: Instant,
    calls: Mutex<Vec<(FetchOp, Duration)>>,
    fetch_delay: Duration,
    fail: bool,
}

impl RecordingProvider {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            cache: WeatherCache::new(),
            origin: Instant::now(),
            calls: Mutex::new(Vec::new()),
            fetch_delay: Duration::ZERO,
            fail: false,
        }
    }

    /// Weather only: no combined fetch, no pollution.
    pub fn basic() -> Self {
        Self::new(Capabilities {
            combined_fetch: false,
            hourly: true,
            current_pollution: false,
            forecast_pollution: false,
        })
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<(FetchOp, Duration)> {
        self.calls.lock().clone()
    }

    /// Milliseconds since creation at which `op` started.
    pub fn times_of(&self, op: FetchOp) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, at)| at.as_millis() as u64)
            .collect()
    }

    async fn simulate(&self, op: FetchOp) -> Result<(), WeatherError> {
        let seq = {
            let mut calls = self.calls.lock();
            calls.push((op, self.origin.elapsed()));
            calls.len()
        };

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if self.fail {
            return Err(WeatherError::Parse("simulated failure".to_string()));
        }

        let reading = seq as f64;
        match op {
            FetchOp::All => {
                self.cache
                    .set_weather_all(sample_current(reading), sample_hours(), sample_days());
            }
            FetchOp::Current => self
                .cache
                .set_current_weather(Some(Arc::new(sample_current(reading)))),
            FetchOp::Forecast => self.cache.set_weather_forecast(Some(Arc::new(sample_days()))),
            FetchOp::Hourly => self.cache.set_weather_hourly(Some(Arc::new(sample_hours()))),
            FetchOp::CurrentPollution => self
                .cache
                .set_current_pollution(Some(Arc::new(sample_air(reading)))),
            FetchOp::PollutionForecast => self
                .cache
                .set_pollution_forecast(Some(Arc::new(vec![sample_air(reading)]))),
        }
        Ok(())
    }
}

#[async_trait]
impl WeatherProvider for RecordingProvider {
    fn name(&self) -> &str {
        "Recording"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    async fn fetch_current_weather(&self) -> Result<(), WeatherError> {
        self.simulate(FetchOp::Current).await
    }

    async fn fetch_weather_forecast(&self) -> Result<(), WeatherError> {
        self.simulate(FetchOp::Forecast).await
    }

    async fn fetch_weather_hourly(&self) -> Result<(), WeatherError> {
        self.simulate(FetchOp::Hourly).await
    }

    async fn fetch_current_pollution(&self) -> Result<(), WeatherError> {
        if !self.capabilities.current_pollution {
            return Err(WeatherError::Unsupported("current pollution"));
        }
        self.simulate(FetchOp::CurrentPollution).await
    }

    async fn fetch_pollution_forecast(&self) -> Result<(), WeatherError> {
        if !self.capabilities.forecast_pollution {
            return Err(WeatherError::Unsupported("pollution forecast"));
        }
        self.simulate(FetchOp::PollutionForecast).await
    }

    async fn fetch_weather_all(&self) -> Result<(), WeatherError> {
        if !self.capabilities.combined_fetch {
            return Err(WeatherError::Unsupported("combined fetch"));
        }
        self.simulate(FetchOp::All).await
    }
}

fn noon() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

pub fn sample_current(temperature: f64) -> CurrentWeather {
    CurrentWeather {
        temperature,
        feels_like: temperature,
        humidity: 50,
        wind_speed: 8.0,
        condition: WeatherCondition::PartlyCloudy,
        observed_at: noon(),
        fetched_at: Utc::now(),
    }
}

pub fn sample_hours() -> Vec<HourlyForecast> {
    vec![HourlyForecast {
        time: noon(),
        temperature: 9.0,
        condition: WeatherCondition::Drizzle,
        precipitation_chance: 40,
    }]
}

pub fn sample_days() -> Vec<DayForecast> {
    vec![DayForecast {
        date: noon().date(),
        high: 11.0,
        low: 3.0,
        condition: WeatherCondition::Rain,
        precipitation_chance: 70,
        sunrise: None,
        sunset: None,
    }]
}

pub fn sample_air(aqi: f64) -> AirQuality {
    AirQuality {
        time: noon(),
        european_aqi: Some(aqi as u16),
        pm2_5: Some(4.2),
        pm10: Some(9.8),
    }
}

/// Compare start times allowing one millisecond of timer rounding.
pub fn assert_times(actual: &[u64], expected: &[u64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "expected fetches at {:?}, got {:?}",
        expected,
        actual
    );
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            a.abs_diff(*e) <= 1,
            "expected fetches at {:?}, got {:?}",
            expected,
            actual
        );
    }
}

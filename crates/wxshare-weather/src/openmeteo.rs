//! Open-Meteo backend producer.
//! Forecast and air quality endpoints are free and need no API key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use wxshare_core::{ProducerConfig, ReqwestErrorExt, TemperatureUnit};

use crate::cache::WeatherCache;
use crate::provider::{Capabilities, WeatherProvider, FETCH_TIMEOUT};
use crate::types::{
    AirQuality, CurrentWeather, DayForecast, HourlyForecast, WeatherCondition, WeatherError,
};

const USER_AGENT: &str = "wxshare/0.1.0";
const FORECAST_DAYS: u8 = 7;
const POLLUTION_FORECAST_DAYS: u8 = 4;

const CURRENT_FIELDS: &str =
    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code";
const HOURLY_FIELDS: &str = "temperature_2m,weather_code,precipitation_probability";
const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max,sunrise,sunset";
const AIR_QUALITY_FIELDS: &str = "european_aqi,pm2_5,pm10";

/// Open-Meteo returns local times without seconds or offset.
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
    hourly: Option<HourlyBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    time: String,
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: i32,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    weather_code: Vec<Option<i32>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    weather_code: Vec<Option<i32>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<Option<String>>,
    #[serde(default)]
    sunset: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: Option<AirQualityCurrent>,
    hourly: Option<AirQualityHourly>,
}

#[derive(Debug, Deserialize)]
struct AirQualityCurrent {
    time: String,
    european_aqi: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AirQualityHourly {
    time: Vec<String>,
    #[serde(default)]
    european_aqi: Vec<Option<f64>>,
    #[serde(default)]
    pm2_5: Vec<Option<f64>>,
    #[serde(default)]
    pm10: Vec<Option<f64>>,
}

/// Which blocks a forecast request asks for
#[derive(Debug, Clone, Copy, Default)]
struct Blocks {
    current: bool,
    hourly: bool,
    daily: bool,
}

#[derive(Debug)]
pub struct OpenMeteoProvider {
    client: Client,
    forecast_url: String,
    air_quality_url: String,
    latitude: f64,
    longitude: f64,
    unit: TemperatureUnit,
    cache: WeatherCache,
}

impl OpenMeteoProvider {
    pub fn from_config(config: &ProducerConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            forecast_url: config.base_url.clone(),
            air_quality_url: config.air_quality_url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            unit: config.temperature_unit,
            cache: WeatherCache::new(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))
    }

    async fn fetch_forecast(&self, blocks: Blocks) -> Result<ForecastResponse, WeatherError> {
        let mut query = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("timezone", "auto".to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
        ];
        if self.unit == TemperatureUnit::Fahrenheit {
            query.push(("temperature_unit", "fahrenheit".to_string()));
        }
        if blocks.current {
            query.push(("current", CURRENT_FIELDS.to_string()));
        }
        if blocks.hourly {
            query.push(("hourly", HOURLY_FIELDS.to_string()));
        }
        if blocks.daily {
            query.push(("daily", DAILY_FIELDS.to_string()));
        }

        tracing::debug!("Requesting Open-Meteo forecast {:?}", blocks);
        self.get_json(&self.forecast_url, &query).await
    }

    async fn fetch_air_quality(
        &self,
        current: bool,
        hourly: bool,
    ) -> Result<AirQualityResponse, WeatherError> {
        let mut query = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("timezone", "auto".to_string()),
            ("forecast_days", POLLUTION_FORECAST_DAYS.to_string()),
        ];
        if current {
            query.push(("current", AIR_QUALITY_FIELDS.to_string()));
        }
        if hourly {
            query.push(("hourly", AIR_QUALITY_FIELDS.to_string()));
        }

        tracing::debug!("Requesting Open-Meteo air quality");
        self.get_json(&self.air_quality_url, &query).await
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "OpenMeteo"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    async fn fetch_current_weather(&self) -> Result<(), WeatherError> {
        let response = self
            .fetch_forecast(Blocks {
                current: true,
                ..Blocks::default()
            })
            .await?;
        let current = parse_current(missing(response.current, "current")?)?;
        self.cache.set_current_weather(Some(Arc::new(current)));
        Ok(())
    }

    async fn fetch_weather_forecast(&self) -> Result<(), WeatherError> {
        let response = self
            .fetch_forecast(Blocks {
                daily: true,
                ..Blocks::default()
            })
            .await?;
        let days = parse_daily(missing(response.daily, "daily")?)?;
        self.cache.set_weather_forecast(Some(Arc::new(days)));
        Ok(())
    }

    async fn fetch_weather_hourly(&self) -> Result<(), WeatherError> {
        let response = self
            .fetch_forecast(Blocks {
                hourly: true,
                ..Blocks::default()
            })
            .await?;
        let hours = parse_hourly(missing(response.hourly, "hourly")?)?;
        self.cache.set_weather_hourly(Some(Arc::new(hours)));
        Ok(())
    }

    async fn fetch_current_pollution(&self) -> Result<(), WeatherError> {
        let response = self.fetch_air_quality(true, false).await?;
        let sample = missing(response.current, "current")?;
        let quality = AirQuality {
            time: parse_local_time(&sample.time)?,
            european_aqi: sample.european_aqi.map(to_aqi),
            pm2_5: sample.pm2_5,
            pm10: sample.pm10,
        };
        self.cache.set_current_pollution(Some(Arc::new(quality)));
        Ok(())
    }

    async fn fetch_pollution_forecast(&self) -> Result<(), WeatherError> {
        let response = self.fetch_air_quality(false, true).await?;
        let samples = parse_air_quality_hourly(missing(response.hourly, "hourly")?)?;
        self.cache.set_pollution_forecast(Some(Arc::new(samples)));
        Ok(())
    }

    async fn fetch_weather_all(&self) -> Result<(), WeatherError> {
        let response = self
            .fetch_forecast(Blocks {
                current: true,
                hourly: true,
                daily: true,
            })
            .await?;

        // Parse everything before storing so a bad block leaves all slots untouched
        let current = parse_current(missing(response.current, "current")?)?;
        let hours = parse_hourly(missing(response.hourly, "hourly")?)?;
        let days = parse_daily(missing(response.daily, "daily")?)?;

        self.cache.set_weather_all(current, hours, days);
        Ok(())
    }
}

fn missing<T>(block: Option<T>, name: &str) -> Result<T, WeatherError> {
    block.ok_or_else(|| WeatherError::Parse(format!("response has no '{}' block", name)))
}

fn parse_local_time(raw: &str) -> Result<NaiveDateTime, WeatherError> {
    NaiveDateTime::parse_from_str(raw, LOCAL_TIME_FORMAT)
        .map_err(|e| WeatherError::Parse(format!("bad time '{}': {}", raw, e)))
}

fn percent(value: Option<f64>) -> u8 {
    value.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8
}

fn to_aqi(value: f64) -> u16 {
    value.clamp(0.0, f64::from(u16::MAX)).round() as u16
}

fn parse_current(block: CurrentBlock) -> Result<CurrentWeather, WeatherError> {
    Ok(CurrentWeather {
        temperature: block.temperature_2m,
        feels_like: block.apparent_temperature,
        humidity: percent(Some(block.relative_humidity_2m)),
        wind_speed: block.wind_speed_10m,
        condition: WeatherCondition::from_wmo_code(block.weather_code),
        observed_at: parse_local_time(&block.time)?,
        fetched_at: Utc::now(),
    })
}

fn parse_hourly(block: HourlyBlock) -> Result<Vec<HourlyForecast>, WeatherError> {
    let mut hours = Vec::with_capacity(block.time.len());
    for (i, time) in block.time.iter().enumerate() {
        // Hours past the model horizon come back as nulls
        let Some(temperature) = block.temperature_2m.get(i).copied().flatten() else {
            continue;
        };
        hours.push(HourlyForecast {
            time: parse_local_time(time)?,
            temperature,
            condition: WeatherCondition::from_wmo_code(
                block.weather_code.get(i).copied().flatten().unwrap_or(0),
            ),
            precipitation_chance: percent(block.precipitation_probability.get(i).copied().flatten()),
        });
    }
    Ok(hours)
}

fn parse_daily(block: DailyBlock) -> Result<Vec<DayForecast>, WeatherError> {
    let mut days = Vec::with_capacity(block.time.len());
    for (i, date) in block.time.iter().enumerate() {
        let (Some(high), Some(low)) = (
            block.temperature_2m_max.get(i).copied().flatten(),
            block.temperature_2m_min.get(i).copied().flatten(),
        ) else {
            continue;
        };
        let sun_time = |times: &[Option<String>]| -> Result<_, WeatherError> {
            times
                .get(i)
                .and_then(|t| t.as_deref())
                .map(|t| parse_local_time(t).map(|dt| dt.time()))
                .transpose()
        };

        days.push(DayForecast {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| WeatherError::Parse(format!("bad date '{}': {}", date, e)))?,
            high,
            low,
            condition: WeatherCondition::from_wmo_code(
                block.weather_code.get(i).copied().flatten().unwrap_or(0),
            ),
            precipitation_chance: percent(
                block.precipitation_probability_max.get(i).copied().flatten(),
            ),
            sunrise: sun_time(&block.sunrise)?,
            sunset: sun_time(&block.sunset)?,
        });
    }
    Ok(days)
}

fn parse_air_quality_hourly(block: AirQualityHourly) -> Result<Vec<AirQuality>, WeatherError> {
    block
        .time
        .iter()
        .enumerate()
        .map(|(i, time)| {
            Ok(AirQuality {
                time: parse_local_time(time)?,
                european_aqi: block.european_aqi.get(i).copied().flatten().map(to_aqi),
                pm2_5: block.pm2_5.get(i).copied().flatten(),
                pm10: block.pm10.get(i).copied().flatten(),
            })
        })
        .collect()
}

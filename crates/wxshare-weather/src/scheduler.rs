//! Recurring fetch timers for one producer.
//!
//! Each enabled category gets its own repeating timer: one initial delay,
//! then a fixed period, until the scheduler is shut down. A tick decides
//! which producer fetches to trigger, spawns them and returns without
//! waiting for them to finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wxshare_core::{IntervalSetting, ScheduleType, SchedulerConfig};

use crate::provider::{Capabilities, WeatherProvider};
use crate::types::{Category, WeatherError};

/// Timer settings for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub category: Category,
    pub interval: IntervalSetting,
    /// `None` waits one full interval before the first fetch
    pub initial_delay: Option<Duration>,
}

impl ScheduleEntry {
    pub fn new(category: Category, interval: IntervalSetting, initial_delay: Option<Duration>) -> Self {
        Self {
            category,
            interval,
            initial_delay,
        }
    }

    /// Delay before the first tick, or `None` if this entry never arms.
    pub fn first_delay(&self) -> Option<Duration> {
        let period = self.interval.duration()?;
        Some(self.initial_delay.unwrap_or(period))
    }

    /// Derive the entries a scheduler config asks for.
    ///
    /// `full` covers current, forecast and both pollution categories; any
    /// other type schedules just its own category. An unknown type is logged
    /// and yields no entries.
    pub fn from_config(config: &SchedulerConfig) -> Vec<ScheduleEntry> {
        let delay = config.initial_delay();
        let current = || {
            ScheduleEntry::new(
                Category::Current,
                config.update_interval_current_weather_ms.clone(),
                delay,
            )
        };
        let forecast = |category| {
            ScheduleEntry::new(
                category,
                config.update_interval_forecast_weather_ms.clone(),
                delay,
            )
        };

        match config.schedule_type() {
            Ok(ScheduleType::Full) => vec![
                current(),
                forecast(Category::Forecast),
                ScheduleEntry::new(
                    Category::CurrentPollution,
                    config.update_interval_current_pollution_ms.clone(),
                    delay,
                ),
                ScheduleEntry::new(
                    Category::ForecastPollution,
                    config.update_interval_forecast_pollution_ms.clone(),
                    delay,
                ),
            ],
            Ok(ScheduleType::Current) => vec![current()],
            Ok(ScheduleType::Forecast | ScheduleType::Daily) => vec![forecast(Category::Forecast)],
            Ok(ScheduleType::Hourly) => vec![forecast(Category::Hourly)],
            Err(e) => {
                tracing::error!("Invalid type configured: {}", e);
                Vec::new()
            }
        }
    }
}

/// A single call into the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOp {
    All,
    Current,
    Forecast,
    Hourly,
    CurrentPollution,
    PollutionForecast,
}

impl FetchOp {
    async fn run(self, provider: &dyn WeatherProvider) -> Result<(), WeatherError> {
        match self {
            Self::All => provider.fetch_weather_all().await,
            Self::Current => provider.fetch_current_weather().await,
            Self::Forecast => provider.fetch_weather_forecast().await,
            Self::Hourly => provider.fetch_weather_hourly().await,
            Self::CurrentPollution => provider.fetch_current_pollution().await,
            Self::PollutionForecast => provider.fetch_pollution_forecast().await,
        }
    }
}

/// Fetches one tick of `category` triggers.
///
/// A producer with a combined fetch serves current, hourly and daily in one
/// call. The forecast timer then only uses it when no current timer is armed,
/// otherwise the same request would go out twice. Pollution ticks against a
/// producer without pollution support do nothing.
pub fn dispatch_plan(
    category: Category,
    capabilities: Capabilities,
    current_armed: bool,
) -> Vec<FetchOp> {
    match category {
        Category::Current if capabilities.combined_fetch => vec![FetchOp::All],
        Category::Current => vec![FetchOp::Current],
        Category::Forecast if capabilities.combined_fetch => {
            if current_armed {
                Vec::new()
            } else {
                vec![FetchOp::All]
            }
        }
        Category::Forecast => vec![FetchOp::Hourly, FetchOp::Forecast],
        Category::Hourly => vec![FetchOp::Hourly],
        Category::CurrentPollution if capabilities.current_pollution => {
            vec![FetchOp::CurrentPollution]
        }
        Category::ForecastPollution if capabilities.forecast_pollution => {
            vec![FetchOp::PollutionForecast]
        }
        Category::CurrentPollution | Category::ForecastPollution => Vec::new(),
    }
}

/// Per-timer dispatch state
struct Dispatcher {
    category: Category,
    plan: Vec<FetchOp>,
    provider: Arc<dyn WeatherProvider>,
    /// Fetches from the previous tick that have not returned yet
    in_flight: Arc<AtomicUsize>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Dispatcher {
    fn dispatch(&self) {
        if self.plan.is_empty() {
            tracing::debug!("{} tick: nothing to fetch", self.category);
            return;
        }

        let pending = self.in_flight.load(Ordering::Acquire);
        if pending > 0 {
            tracing::debug!(
                "{} tick skipped: {} fetch(es) from the previous tick still running",
                self.category,
                pending
            );
            return;
        }

        self.in_flight.store(self.plan.len(), Ordering::Release);
        for &op in &self.plan {
            tracing::debug!("{} tick: {:?}", self.category, op);

            let category = self.category;
            let provider = Arc::clone(&self.provider);
            let in_flight = Arc::clone(&self.in_flight);
            let cancel = self.cancel.clone();

            self.tracker.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = op.run(provider.as_ref()) => {
                        match result {
                            Ok(()) => {}
                            Err(e) if e.is_transient() => {
                                tracing::warn!("{} fetch {:?} from {} failed: {}", category, op, provider.name(), e);
                            }
                            Err(e) => {
                                tracing::error!("{} fetch {:?} from {} failed: {}", category, op, provider.name(), e);
                            }
                        }
                    }
                }
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}

pub struct Scheduler {
    provider: Arc<dyn WeatherProvider>,
    entries: Vec<ScheduleEntry>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: bool,
}

impl Scheduler {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            entries: Vec::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: false,
        }
    }

    /// Replace the schedule. Disabled and malformed entries are dropped, as
    /// is `hourly` when the producer has no hourly data.
    pub fn configure(&mut self, entries: impl IntoIterator<Item = ScheduleEntry>) {
        let capabilities = self.provider.capabilities();
        self.entries.clear();

        for entry in entries {
            match &entry.interval {
                IntervalSetting::Every(_) => {}
                IntervalSetting::Disabled => {
                    tracing::debug!("{} updates disabled", entry.category);
                    continue;
                }
                IntervalSetting::Malformed(raw) => {
                    tracing::error!(
                        "Invalid update interval {:?} for {}; not scheduling it",
                        raw,
                        entry.category
                    );
                    continue;
                }
            }

            if entry.category == Category::Hourly && !capabilities.hourly {
                tracing::error!(
                    "{} has no hourly data; hourly updates not scheduled",
                    self.provider.name()
                );
                continue;
            }

            if self.entries.iter().any(|e| e.category == entry.category) {
                tracing::warn!("Duplicate schedule for {}; keeping the first", entry.category);
                continue;
            }

            self.entries.push(entry);
        }
    }

    /// Categories that get a timer.
    pub fn armed(&self) -> Vec<Category> {
        self.entries.iter().map(|e| e.category).collect()
    }

    /// Arm one timer per configured category. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self) {
        if self.started {
            tracing::warn!("Scheduler already started");
            return;
        }
        self.started = true;

        let capabilities = self.provider.capabilities();
        let current_armed = self.entries.iter().any(|e| e.category == Category::Current);

        for entry in &self.entries {
            let (Some(period), Some(first)) = (entry.interval.duration(), entry.first_delay())
            else {
                continue;
            };

            let dispatcher = Dispatcher {
                category: entry.category,
                plan: dispatch_plan(entry.category, capabilities, current_armed),
                provider: Arc::clone(&self.provider),
                in_flight: Arc::new(AtomicUsize::new(0)),
                tracker: self.tracker.clone(),
                cancel: self.cancel.clone(),
            };

            tracing::info!(
                "Scheduling {} updates from {} every {:?}, first in {:?}",
                entry.category,
                self.provider.name(),
                period,
                first
            );

            let cancel = self.cancel.clone();
            self.tracker.spawn(async move {
                let mut ticker = interval_at(Instant::now() + first, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => dispatcher.dispatch(),
                    }
                }
            });
        }
    }

    /// Stop all timers and abandon pending fetches.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Scheduler for {} stopped", self.provider.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_combined() -> Capabilities {
        Capabilities {
            combined_fetch: false,
            hourly: true,
            current_pollution: false,
            forecast_pollution: false,
        }
    }

    #[test]
    fn test_current_prefers_combined_fetch() {
        assert_eq!(
            dispatch_plan(Category::Current, Capabilities::all(), true),
            vec![FetchOp::All]
        );
        assert_eq!(
            dispatch_plan(Category::Current, without_combined(), true),
            vec![FetchOp::Current]
        );
    }

    #[test]
    fn test_forecast_with_combined_depends_on_current_timer() {
        assert!(dispatch_plan(Category::Forecast, Capabilities::all(), true).is_empty());
        assert_eq!(
            dispatch_plan(Category::Forecast, Capabilities::all(), false),
            vec![FetchOp::All]
        );
    }

    #[test]
    fn test_forecast_without_combined_fetches_hourly_and_daily() {
        assert_eq!(
            dispatch_plan(Category::Forecast, without_combined(), true),
            vec![FetchOp::Hourly, FetchOp::Forecast]
        );
    }

    #[test]
    fn test_pollution_without_capability_is_noop() {
        assert!(dispatch_plan(Category::CurrentPollution, without_combined(), true).is_empty());
        assert!(dispatch_plan(Category::ForecastPollution, without_combined(), true).is_empty());
        assert_eq!(
            dispatch_plan(Category::ForecastPollution, Capabilities::all(), true),
            vec![FetchOp::PollutionForecast]
        );
    }

    #[test]
    fn test_first_delay_defaults_to_interval() {
        let entry = ScheduleEntry::new(Category::Current, IntervalSetting::Every(5000), None);
        assert_eq!(entry.first_delay(), Some(Duration::from_millis(5000)));

        let entry = ScheduleEntry::new(
            Category::Current,
            IntervalSetting::Every(5000),
            Some(Duration::ZERO),
        );
        assert_eq!(entry.first_delay(), Some(Duration::ZERO));

        let entry = ScheduleEntry::new(Category::Current, IntervalSetting::Disabled, None);
        assert_eq!(entry.first_delay(), None);
    }

    #[test]
    fn test_full_config_yields_four_entries() {
        let entries = ScheduleEntry::from_config(&SchedulerConfig::default());
        let categories: Vec<Category> = entries.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Current,
                Category::Forecast,
                Category::CurrentPollution,
                Category::ForecastPollution
            ]
        );
        assert!(entries.iter().all(|e| e.initial_delay == Some(Duration::ZERO)));
    }

    #[test]
    fn test_single_type_uses_matching_interval() {
        let config = SchedulerConfig {
            schedule_type: "hourly".to_string(),
            update_interval_forecast_weather_ms: IntervalSetting::Every(900),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            ScheduleEntry::from_config(&config),
            vec![ScheduleEntry::new(
                Category::Hourly,
                IntervalSetting::Every(900),
                Some(Duration::ZERO)
            )]
        );

        let config = SchedulerConfig {
            schedule_type: "daily".to_string(),
            ..SchedulerConfig::default()
        };
        assert_eq!(ScheduleEntry::from_config(&config)[0].category, Category::Forecast);
    }

    #[test]
    fn test_unknown_type_yields_nothing() {
        let config = SchedulerConfig {
            schedule_type: "weekly".to_string(),
            ..SchedulerConfig::default()
        };
        assert!(ScheduleEntry::from_config(&config).is_empty());
    }
}

//! Shared weather polling for wxshare
//!
//! One producer fetches from a weather backend on per-category timers; any
//! number of proxy readers resolve that producer by name and hand its
//! latest datasets to their own consumers.

pub mod cache;
pub mod openmeteo;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use cache::{UpdateEvent, WeatherCache};
pub use openmeteo::OpenMeteoProvider;
pub use provider::{create_provider, Capabilities, WeatherProvider, FETCH_TIMEOUT};
pub use proxy::{ProxyConfig, ProxyWeatherProvider};
pub use registry::{ProviderDirectory, ProviderRegistration, ResolveError};
pub use scheduler::{dispatch_plan, FetchOp, ScheduleEntry, Scheduler};
pub use types::*;

//! Proxy readers resolving and mirroring a shared producer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{sample_air, sample_current, sample_days, RecordingProvider};
use wxshare_core::IntervalSetting;
use wxshare_weather::{
    Category, ProviderDirectory, ProxyConfig, ProxyWeatherProvider, ScheduleEntry, Scheduler,
    UpdateEvent, WeatherProvider,
};

fn same<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn proxy_for(
    directory: &Arc<ProviderDirectory>,
    endpoint: &str,
    endpoint_id: Option<&str>,
) -> ProxyWeatherProvider {
    ProxyWeatherProvider::new(
        ProxyConfig {
            weather_endpoint: endpoint.to_string(),
            weather_endpoint_id: endpoint_id.map(str::to_string),
        },
        Arc::clone(directory),
    )
}

#[test]
fn test_resolves_single_registered_producer() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    directory.register("X", None, producer.clone());

    let proxy = proxy_for(&directory, "X", None);
    let resolved = proxy.resolve_producer().unwrap();

    assert!(same(&resolved, &producer));
    assert!(proxy.is_bound());
}

#[test]
fn test_no_producer_leaves_proxy_unbound() {
    let directory = Arc::new(ProviderDirectory::new());
    directory.register("Y", None, Arc::new(RecordingProvider::basic()));

    let proxy = proxy_for(&directory, "X", None);

    assert!(proxy.resolve_producer().is_none());
    assert!(!proxy.is_bound());
}

#[test]
fn test_endpoint_id_picks_between_same_named_producers() {
    let directory = Arc::new(ProviderDirectory::new());
    let north = Arc::new(RecordingProvider::basic());
    let south = Arc::new(RecordingProvider::basic());
    directory.register("X", Some("north".to_string()), north.clone());
    directory.register("X", Some("south".to_string()), south.clone());

    let proxy = proxy_for(&directory, "X", Some("south"));
    let resolved = proxy.resolve_producer().unwrap();

    assert!(same(&resolved, &south));
    assert!(!same(&resolved, &north));
}

#[test]
fn test_same_named_producers_without_id_do_not_bind() {
    let directory = Arc::new(ProviderDirectory::new());
    directory.register("X", Some("north".to_string()), Arc::new(RecordingProvider::basic()));
    directory.register("X", Some("south".to_string()), Arc::new(RecordingProvider::basic()));

    let proxy = proxy_for(&directory, "X", None);

    assert!(proxy.resolve_producer().is_none());
    assert!(!proxy.is_bound());
}

#[test]
fn test_binding_is_memoized() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    directory.register("X", None, producer.clone());

    let proxy = proxy_for(&directory, "X", None);
    let first = proxy.resolve_producer().unwrap();

    // A second same-named producer would make a fresh lookup ambiguous
    directory.register("X", None, Arc::new(RecordingProvider::basic()));
    let second = proxy.resolve_producer().unwrap();

    assert!(same(&first, &second));
    assert!(same(&second, &producer));
    assert_eq!(directory.lookups(), 1);
}

#[test]
fn test_clear_binding_resolves_again() {
    let directory = Arc::new(ProviderDirectory::new());
    let old = Arc::new(RecordingProvider::basic());
    directory.register("X", Some("old".to_string()), old.clone());

    let proxy = proxy_for(&directory, "X", Some("new"));
    assert!(same(&proxy.resolve_producer().unwrap(), &old));

    let new = Arc::new(RecordingProvider::basic());
    directory.register("X", Some("new".to_string()), new.clone());
    proxy.clear_binding();

    assert!(!proxy.is_bound());
    assert!(same(&proxy.resolve_producer().unwrap(), &new));
    assert_eq!(directory.lookups(), 2);
}

#[tokio::test]
async fn test_fetch_copies_latest_value_without_network() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    producer
        .cache()
        .set_current_weather(Some(Arc::new(sample_current(17.5))));
    directory.register("X", None, producer.clone());

    let proxy = proxy_for(&directory, "X", None);
    proxy.fetch_current_weather().await.unwrap();

    let mirrored = proxy.current_weather().unwrap();
    let original = producer.current_weather().unwrap();
    assert!(Arc::ptr_eq(&mirrored, &original));
    assert_eq!(mirrored.temperature, 17.5);
    assert!(producer.calls().is_empty());
}

#[tokio::test]
async fn test_every_read_entry_point_mirrors_producer() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    let cache = producer.cache();
    cache.set_weather_forecast(Some(Arc::new(sample_days())));
    cache.set_weather_hourly(Some(Arc::new(Vec::new())));
    cache.set_current_pollution(Some(Arc::new(sample_air(35.0))));
    cache.set_pollution_forecast(Some(Arc::new(vec![sample_air(50.0)])));
    directory.register("X", None, producer.clone());

    let proxy = proxy_for(&directory, "X", None);
    for category in Category::ALL {
        proxy.fetch(category).await.unwrap();
    }

    // Never fetched by the producer, so the mirror stays empty too
    assert!(proxy.current_weather().is_none());
    assert_eq!(proxy.weather_forecast(), producer.weather_forecast());
    assert_eq!(proxy.weather_hourly(), producer.weather_hourly());
    assert_eq!(proxy.current_pollution(), producer.current_pollution());
    assert_eq!(proxy.pollution_forecast(), producer.pollution_forecast());
    assert!(producer.calls().is_empty());
}

#[tokio::test]
async fn test_fetch_notifies_proxy_consumers() {
    let directory = Arc::new(ProviderDirectory::new());
    directory.register("X", None, Arc::new(RecordingProvider::basic()));

    let proxy = proxy_for(&directory, "X", None);
    let mut updates = proxy.subscribe();
    proxy.fetch_weather_hourly().await.unwrap();

    assert_eq!(
        updates.try_recv().unwrap(),
        UpdateEvent {
            category: Category::Hourly
        }
    );
}

#[tokio::test]
async fn test_unresolved_proxy_keeps_stale_data() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    producer
        .cache()
        .set_current_weather(Some(Arc::new(sample_current(5.0))));
    directory.register("X", None, producer.clone());

    let proxy = proxy_for(&directory, "X", None);
    proxy.fetch_current_weather().await.unwrap();

    // Rebinding fails once the name becomes ambiguous
    directory.register("X", None, Arc::new(RecordingProvider::basic()));
    proxy.clear_binding();
    proxy.fetch_current_weather().await.unwrap();

    assert_eq!(proxy.current_weather().unwrap().temperature, 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_producer_feeds_proxy() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    directory.register("X", None, producer.clone());

    let mut scheduler = Scheduler::new(producer.clone());
    scheduler.configure([ScheduleEntry::new(
        Category::Current,
        IntervalSetting::Every(1000),
        Some(Duration::ZERO),
    )]);
    scheduler.start();

    let proxy = proxy_for(&directory, "X", None);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    proxy.fetch_current_weather().await.unwrap();
    scheduler.shutdown().await;

    // Second producer fetch stored reading 2.0
    assert_eq!(proxy.current_weather().unwrap().temperature, 2.0);
    assert_eq!(producer.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_can_drive_a_proxy() {
    let directory = Arc::new(ProviderDirectory::new());
    let producer = Arc::new(RecordingProvider::basic());
    producer
        .cache()
        .set_current_weather(Some(Arc::new(sample_current(21.0))));
    directory.register("X", None, producer.clone());

    let proxy = Arc::new(proxy_for(&directory, "X", None));
    let mut scheduler = Scheduler::new(proxy.clone());
    scheduler.configure([ScheduleEntry::new(
        Category::Current,
        IntervalSetting::Every(1000),
        Some(Duration::ZERO),
    )]);
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.shutdown().await;

    assert_eq!(proxy.current_weather().unwrap().temperature, 21.0);
    assert!(producer.calls().is_empty());
}

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wxshare_core::{Config, ConfigError};
use wxshare_weather::{
    create_provider, ProviderDirectory, ProxyConfig, ProxyWeatherProvider, ScheduleEntry,
    Scheduler,
};

mod widget;

use widget::Widget;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize core
    wxshare_core::init()?;

    let (config, validation) = Config::load_validated().inspect_err(|e| {
        if let Some(config_err) = e.downcast_ref::<ConfigError>() {
            tracing::error!("{}", config_err.user_message());
        }
    })?;
    if !validation.is_valid() {
        tracing::warn!(
            "Continuing with invalid settings disabled: {}",
            validation.error_summary()
        );
    }

    // Shared producer
    let directory = Arc::new(ProviderDirectory::new());
    let producer = create_provider(&config.producer).inspect_err(|e| {
        tracing::error!("{}", e.user_message());
    })?;
    directory.register(
        config.producer.name.clone(),
        config.producer.weather_endpoint_id.clone(),
        Arc::clone(&producer),
    );

    let mut scheduler = Scheduler::new(producer);
    scheduler.configure(ScheduleEntry::from_config(&config.scheduler));
    scheduler.start();

    // Readers
    let cancel = CancellationToken::new();
    let widgets = TaskTracker::new();
    for widget_config in &config.widgets {
        let proxy = Arc::new(ProxyWeatherProvider::new(
            ProxyConfig::from(widget_config),
            Arc::clone(&directory),
        ));
        match Widget::new(widget_config, proxy) {
            Ok(widget) if widget.refresh().is_none() => {
                tracing::info!("Widget {} has refresh disabled; not started", widget.name());
            }
            Ok(widget) => {
                widgets.spawn(widget.run(cancel.clone()));
            }
            Err(e) => tracing::error!("Skipping widget {}: {}", widget_config.name, e),
        }
    }
    widgets.close();

    tracing::info!(
        "wxshare started: producer {} with {} widget(s)",
        config.producer.name,
        widgets.len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    // Graceful shutdown
    cancel.cancel();
    widgets.wait().await;
    scheduler.shutdown().await;

    Ok(())
}

pub mod api;
pub mod config;
pub mod logger;
pub mod metrics;
pub mod ratelimit;
pub mod sheets;
pub mod waitlist;

use api::{AppState, DriverFactory};
use config::AppConfig;
use metrics::RowSink;
use ratelimit::FixedWindowLimiter;
use sheets::{SheetsClient, SheetsLeadStore, SheetsSink};
use std::sync::Arc;
use std::time::Duration;
use waitlist::LeadStore;

impl AppState {
    /// Wire the real drivers and, when configured, the Sheets sinks.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let (metrics, leads) = match SheetsClient::from_config(&config.sheets)? {
            Some(client) => {
                let client = Arc::new(client);
                let metrics: Arc<dyn RowSink> =
                    Arc::new(SheetsSink::new(client.clone(), config.sheets.metrics_sheet_name.clone()));
                let leads: Arc<dyn LeadStore> =
                    Arc::new(SheetsLeadStore::new(client, config.sheets.sheet_name.clone()));
                (Some(metrics), Some(leads))
            }
            None => {
                tracing::info!("sheets sink disabled; metrics rows and waitlist are not persisted");
                (None, None)
            }
        };

        Ok(Self {
            drivers: DriverFactory::network(config.probe.accept_invalid_certs),
            settings: config.pipeline_settings(),
            limiter: FixedWindowLimiter::new(
                config.rate_limit.per_window,
                Duration::from_secs(config.rate_limit.window_secs),
            ),
            metrics,
            leads,
        })
    }
}

pub async fn run() -> anyhow::Result<()> {
    let config = config::load_config()?;
    logger::init_tracing(&config.logging);

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::from_config(&config)?);
    api::serve(state, addr).await
}

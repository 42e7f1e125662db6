// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use kh_agentrt::config::Config;
use kh_agentrt::runtime;
use std::error::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = Config::load()?;
    tracing::info!(agent_id = %config.agent_id, platform = %config.platform, "starting agent runtime");

    runtime::run(config).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = std::env::var("KH_LOG_DIR").ok();
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "kha.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Box::leak(Box::new(guard));
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(writer))
                .init();
        }
        None => {
            tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
        }
    }
}

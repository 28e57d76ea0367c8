//! Creates the pool's journals and fills every partition. Run once before the
//! first server start, or again to top partitions up.

use anyhow::Context;
use clap::Parser;
use shardpool_server::server::{
    config::{PrefillArgs, PrefillConfig},
    storage::create_pool,
    telemetry::init_telemetry,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = PrefillArgs::parse();
    let config = PrefillConfig::try_from(args)?;

    let providers = init_telemetry()?;

    tracing::info!(
        data_dir = %config.pool.data_dir.display(),
        count = config.prefill_count,
        "pre-filling partitions"
    );

    let reports = tokio::task::spawn_blocking(move || {
        let pool = create_pool(&config.pool)?;
        anyhow::Ok(pool.prefill(config.prefill_count)?)
    })
    .await
    .context("pre-fill task panicked")??;

    let mut short = 0;
    for report in &reports {
        if report.is_complete() {
            tracing::info!(
                partition = report.partition,
                kind = %report.kind,
                inserted = report.inserted,
                "partition ready"
            );
        } else {
            short += 1;
            tracing::warn!(
                partition = report.partition,
                kind = %report.kind,
                inserted = report.inserted,
                shortfall = report.shortfall(),
                "partition pre-filled short; the value space may be too small"
            );
        }
    }
    tracing::info!(partitions = reports.len(), short, "pre-fill finished");

    providers.shutdown();
    Ok(())
}

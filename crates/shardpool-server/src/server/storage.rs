//! On-disk layout of a pool and the two ways of bringing it up.
//!
//! ```text
//! <data_dir>/partitions/partition_<id>.jsonl
//! <data_dir>/registry/used_int.jsonl
//! <data_dir>/registry/used_float.jsonl
//! ```

use crate::server::{config::PoolConfig, telemetry};
use anyhow::Context;
use shardpool::{
    FileRegistry, FileStore, Kind, PartitionId, PartitionRefiller, PoolAllocator, ThreadRandom,
};
use std::path::{Path, PathBuf};

/// The allocator both binaries run: journal-backed storage, thread-local RNG.
pub type ServerPool = PoolAllocator<FileRegistry, ThreadRandom>;

pub fn partition_path(data_dir: &Path, partition: PartitionId) -> PathBuf {
    data_dir
        .join("partitions")
        .join(format!("partition_{partition}.jsonl"))
}

pub fn registry_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("registry")
}

#[derive(Clone, Copy)]
enum Mode {
    /// Every journal must already exist.
    Open,
    /// Missing journals are created.
    Create,
}

/// Opens an existing pool. Fails fast if any journal is missing or was
/// written under a different configuration.
///
/// # Errors
///
/// Any storage or configuration fault, with the offending path attached.
pub fn open_pool(config: &PoolConfig) -> anyhow::Result<ServerPool> {
    build_pool(config, Mode::Open)
}

/// Opens a pool, creating any journal that does not exist yet.
///
/// # Errors
///
/// Any storage or configuration fault, with the offending path attached.
pub fn create_pool(config: &PoolConfig) -> anyhow::Result<ServerPool> {
    build_pool(config, Mode::Create)
}

fn build_pool(config: &PoolConfig, mode: Mode) -> anyhow::Result<ServerPool> {
    let dir = registry_dir(&config.data_dir);
    let registry = match mode {
        Mode::Open => FileRegistry::open(&dir, &config.space, config.fsync),
        Mode::Create => FileRegistry::create(&dir, &config.space, config.fsync),
    }
    .with_context(|| format!("failed to load registry in {}", dir.display()))?
    .with_backoff(config.backoff);

    let refiller = PartitionRefiller::new(registry, ThreadRandom::new(config.space))
        .with_attempt_factor(config.attempt_factor);

    let mut builder = PoolAllocator::builder(refiller)
        .policy(config.policy)
        .refill_settings(config.refill)
        .backoff(config.backoff)
        .on_refill(telemetry::record_refill);

    for (partition, kind) in config.partitions() {
        let store = load_partition(config, partition, kind, mode)?;
        builder = builder.partition(store.with_backoff(config.backoff));
    }

    Ok(builder.build()?)
}

fn load_partition(
    config: &PoolConfig,
    partition: PartitionId,
    kind: Kind,
    mode: Mode,
) -> anyhow::Result<FileStore> {
    let path = partition_path(&config.data_dir, partition);
    let store = match mode {
        Mode::Open => FileStore::open(&path, partition, kind, &config.space, config.fsync),
        Mode::Create => FileStore::create(&path, partition, kind, &config.space, config.fsync),
    };
    store.with_context(|| format!("failed to load partition {partition} from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::{CliArgs, ServerConfig};
    use clap::Parser;
    use shardpool::{Allocation, TokioYield};

    fn config(dir: &Path) -> PoolConfig {
        let args = CliArgs::try_parse_from([
            "shardpool-server",
            "--data-dir",
            dir.to_str().unwrap(),
            "--int-partitions",
            "1",
            "--float-partitions",
            "1",
        ])
        .unwrap();
        ServerConfig::try_from(args).unwrap().pool
    }

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "shardpool-server-{label}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn open_refuses_a_missing_pool() {
        let dir = scratch("storage-missing");
        assert!(open_pool(&config(&dir)).is_err());
    }

    #[tokio::test]
    async fn prefilled_pool_survives_a_restart() {
        let dir = scratch("storage-restart");
        let config = config(&dir);

        let pool = create_pool(&config).unwrap();
        let reports = pool.prefill(10).unwrap();
        assert!(reports.iter().all(|r| r.inserted == 10));
        assert!(partition_path(&dir, 1).is_file());
        drop(pool);

        let pool = open_pool(&config).unwrap();
        let Allocation::Ready { partition, value } = pool.pop::<TokioYield>(Some(Kind::Float)).await
        else {
            panic!("prefilled float partition is empty");
        };
        assert_eq!(partition, 1);
        assert_eq!(value.kind(), Kind::Float);
        drop(pool);

        let pool = open_pool(&config).unwrap();
        let stats = pool.snapshot();
        assert_eq!(stats.partitions[1].unconsumed, Some(9));
        assert!(stats.registry.iter().all(|r| r.reserved == Some(10)));
    }
}

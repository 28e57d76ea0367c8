use anyhow::bail;
use clap::{Args, Parser, ValueEnum};
use core::time::Duration;
use shardpool::{Backoff, Fixed, Kind, PartitionId, RefillPolicy, RefillSettings, ValueSpace};
use std::path::PathBuf;

/// Which refill policy the allocator runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Refill a partition only once a pop finds it empty.
    Reactive,
    /// Also top up one partition, round-robin, every `--refill-threshold`
    /// successful pops.
    Threshold,
}

/// Pool layout and tuning shared by both binaries.
///
/// The server and the pre-fill tool must agree on every one of these, or the
/// server refuses the journals the pre-fill tool wrote.
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// Root directory of the partition and registry journals.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Number of integer partitions. They take ids `0..n`.
    ///
    /// Environment variable: `INT_PARTITIONS`
    #[arg(long, env = "INT_PARTITIONS", default_value_t = 2)]
    pub int_partitions: u32,

    /// Number of float partitions. They take the ids after the integer ones.
    ///
    /// Environment variable: `FLOAT_PARTITIONS`
    #[arg(long, env = "FLOAT_PARTITIONS", default_value_t = 2)]
    pub float_partitions: u32,

    /// Values requested by each background refill.
    ///
    /// Environment variable: `REFILL_BATCH`
    #[arg(long, env = "REFILL_BATCH", default_value_t = 1000)]
    pub refill_batch: usize,

    /// When partitions are refilled.
    ///
    /// Environment variable: `REFILL_POLICY`
    #[arg(long, env = "REFILL_POLICY", value_enum, default_value_t = PolicyArg::Reactive)]
    pub refill_policy: PolicyArg,

    /// Successful pops between proactive refills (`threshold` policy only).
    ///
    /// Environment variable: `REFILL_THRESHOLD`
    #[arg(long, env = "REFILL_THRESHOLD", default_value_t = 100)]
    pub refill_threshold: u64,

    /// A refill gives up after `target * attempt_factor` candidates.
    ///
    /// Environment variable: `ATTEMPT_FACTOR`
    #[arg(long, env = "ATTEMPT_FACTOR", default_value_t = 10)]
    pub attempt_factor: usize,

    /// Wall-clock cap per refill in milliseconds. `0` means none.
    ///
    /// Environment variable: `REFILL_DEADLINE_MS`
    #[arg(long, env = "REFILL_DEADLINE_MS", default_value_t = 0)]
    pub refill_deadline_ms: u64,

    /// Integer candidates are drawn from `0..2^int_bits`.
    ///
    /// Environment variable: `INT_BITS`
    #[arg(long, env = "INT_BITS", default_value_t = 32)]
    pub int_bits: u32,

    /// Float candidates are drawn from `[0, float_max)`.
    ///
    /// Environment variable: `FLOAT_MAX`
    #[arg(long, env = "FLOAT_MAX", default_value_t = 10_000.0)]
    pub float_max: f64,

    /// Decimal places floats are rounded to before the uniqueness check.
    ///
    /// Environment variable: `FLOAT_DECIMALS`
    #[arg(long, env = "FLOAT_DECIMALS", default_value_t = 4)]
    pub float_decimals: u8,

    /// How long one attempt may wait on a storage lock, in milliseconds.
    ///
    /// Environment variable: `LOCK_TIMEOUT_MS`
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 50)]
    pub lock_timeout_ms: u64,

    /// Attempts made against a locked store before reporting contention.
    ///
    /// Environment variable: `STORAGE_RETRIES`
    #[arg(long, env = "STORAGE_RETRIES", default_value_t = 8)]
    pub storage_retries: u32,

    /// fsync journals after every append.
    ///
    /// Environment variable: `FSYNC`
    #[arg(long, env = "FSYNC", default_value_t = false)]
    pub fsync: bool,
}

/// Runtime configuration for the `shardpool-server` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shardpool-server",
    version,
    about = "An HTTP service handing out pre-generated, globally unique values"
)]
pub struct CliArgs {
    #[command(flatten)]
    pub pool: PoolArgs,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8585"))]
    pub server_addr: String,

    /// Seconds to wait for running refills on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

/// Arguments of the `shardpool-prefill` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shardpool-prefill",
    version,
    about = "Creates the pool's journals and fills every partition before first start"
)]
pub struct PrefillArgs {
    #[command(flatten)]
    pub pool: PoolArgs,

    /// Values generated into each partition.
    ///
    /// Environment variable: `PREFILL_COUNT`
    #[arg(long, env = "PREFILL_COUNT", default_value_t = 5000)]
    pub prefill_count: usize,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub data_dir: PathBuf,
    pub int_partitions: u32,
    pub float_partitions: u32,
    pub space: ValueSpace,
    pub policy: RefillPolicy,
    pub refill: RefillSettings,
    pub attempt_factor: usize,
    pub backoff: Backoff,
    pub fsync: bool,
}

impl PoolConfig {
    /// Every configured partition: integers first, then floats.
    pub fn partitions(&self) -> impl Iterator<Item = (PartitionId, Kind)> + use<> {
        let ints = self.int_partitions;
        let floats = self.float_partitions;
        (0..ints)
            .map(|id| (id, Kind::Int))
            .chain((ints..ints + floats).map(|id| (id, Kind::Float)))
    }
}

impl TryFrom<PoolArgs> for PoolConfig {
    type Error = anyhow::Error;

    fn try_from(args: PoolArgs) -> Result<Self, Self::Error> {
        let Some(total) = args.int_partitions.checked_add(args.float_partitions) else {
            bail!("INT_PARTITIONS + FLOAT_PARTITIONS overflows the partition id space");
        };
        if total == 0 {
            bail!("at least one of INT_PARTITIONS or FLOAT_PARTITIONS must be greater than 0");
        }
        if !(1..=64).contains(&args.int_bits) {
            bail!("INT_BITS ({}) must be between 1 and 64", args.int_bits);
        }
        if args.float_decimals > Fixed::MAX_SCALE {
            bail!(
                "FLOAT_DECIMALS ({}) must be at most {}",
                args.float_decimals,
                Fixed::MAX_SCALE
            );
        }
        if !args.float_max.is_finite() || args.float_max <= 0.0 {
            bail!("FLOAT_MAX ({}) must be a positive number", args.float_max);
        }
        // Rounded floats are stored as integer units and must stay exact.
        let units = args.float_max * 10_f64.powi(i32::from(args.float_decimals));
        if units > (1_u64 << f64::MANTISSA_DIGITS) as f64 {
            bail!(
                "FLOAT_MAX ({}) with FLOAT_DECIMALS ({}) exceeds exact float precision",
                args.float_max,
                args.float_decimals
            );
        }
        if args.refill_batch == 0 {
            bail!("REFILL_BATCH must be greater than 0");
        }
        if args.attempt_factor == 0 {
            bail!("ATTEMPT_FACTOR must be greater than 0");
        }
        if args.storage_retries == 0 {
            bail!("STORAGE_RETRIES must be greater than 0");
        }
        let policy = match args.refill_policy {
            PolicyArg::Reactive => RefillPolicy::Reactive,
            PolicyArg::Threshold if args.refill_threshold == 0 => {
                bail!("REFILL_THRESHOLD must be greater than 0 with the threshold policy")
            }
            PolicyArg::Threshold => RefillPolicy::Threshold {
                every: args.refill_threshold,
            },
        };

        let defaults = Backoff::default();
        Ok(Self {
            data_dir: args.data_dir,
            int_partitions: args.int_partitions,
            float_partitions: args.float_partitions,
            space: ValueSpace::new(args.int_bits, args.float_max, args.float_decimals),
            policy,
            refill: RefillSettings {
                batch: args.refill_batch,
                deadline: (args.refill_deadline_ms > 0)
                    .then(|| Duration::from_millis(args.refill_deadline_ms)),
            },
            attempt_factor: args.attempt_factor,
            backoff: Backoff::new(
                args.storage_retries,
                defaults.base,
                defaults.max,
                Duration::from_millis(args.lock_timeout_ms),
            ),
            fsync: args.fsync,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub server_addr: String,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            pool: PoolConfig::try_from(args.pool)?,
            server_addr: args.server_addr,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PrefillConfig {
    pub pool: PoolConfig,
    pub prefill_count: usize,
}

impl TryFrom<PrefillArgs> for PrefillConfig {
    type Error = anyhow::Error;

    fn try_from(args: PrefillArgs) -> Result<Self, Self::Error> {
        if args.prefill_count == 0 {
            bail!("PREFILL_COUNT must be greater than 0");
        }
        Ok(Self {
            pool: PoolConfig::try_from(args.pool)?,
            prefill_count: args.prefill_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = ["shardpool-server"].iter().chain(extra);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn partitions_number_ints_then_floats() {
        let config = parse(&["--int-partitions", "2", "--float-partitions", "3"]).unwrap();
        let plan: Vec<_> = config.pool.partitions().collect();
        assert_eq!(
            plan,
            vec![
                (0, Kind::Int),
                (1, Kind::Int),
                (2, Kind::Float),
                (3, Kind::Float),
                (4, Kind::Float)
            ]
        );
    }

    #[test]
    fn threshold_policy_carries_its_interval() {
        let config = parse(&["--refill-policy", "threshold", "--refill-threshold", "7"]).unwrap();
        assert_eq!(config.pool.policy, RefillPolicy::Threshold { every: 7 });

        let config = parse(&["--refill-deadline-ms", "250"]).unwrap();
        assert_eq!(config.pool.policy, RefillPolicy::Reactive);
        assert_eq!(config.pool.refill.deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_invalid_settings() {
        let cases: [&[&str]; 8] = [
            &["--int-partitions", "0", "--float-partitions", "0"],
            &["--int-bits", "65"],
            &["--float-decimals", "12"],
            &["--float-max", "-1"],
            &["--float-max", "1e12", "--float-decimals", "9"],
            &["--refill-batch", "0"],
            &["--refill-policy", "threshold", "--refill-threshold", "0"],
            &["--storage-retries", "0"],
        ];
        for bad in cases {
            assert!(parse(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn prefill_count_must_be_positive() {
        let args = PrefillArgs::try_parse_from(["shardpool-prefill", "--prefill-count", "0"]).unwrap();
        assert!(PrefillConfig::try_from(args).is_err());
    }
}

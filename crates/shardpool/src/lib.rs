//! A sharded pool of pre-generated, globally unique numeric values.
//!
//! Values are generated ahead of time into independently stored partitions
//! and served one at a time through [`PoolAllocator::pop`]. Every value ever
//! placed in a partition is first reserved in a per-kind
//! [`UniquenessRegistry`], so no value is ever issued twice, across partitions,
//! refills, and restarts.
//!
//! ## Layers
//!
//! - [`ValueStore`] - per-partition table with atomic random pop.
//! - [`UniquenessRegistry`] - monotonically growing record of issued values.
//! - [`CandidateSource`] - raw candidate generation ([`ThreadRandom`]).
//! - [`PartitionRefiller`] - bounded, partial-progress-safe refill.
//! - [`PoolAllocator`] - active-set management and background refill.
//!
//! Both storage layers come in two flavours that share the same table code:
//! an in-memory engine ([`MemoryStore`], [`MemoryRegistry`]) and an
//! append-only journal engine ([`FileStore`], [`FileRegistry`]).

mod allocator;
mod backoff;
mod error;
mod futures;
mod generator;
mod journal;
mod refill;
mod registry;
mod status;
mod store;
mod value;

pub use crate::allocator::*;
pub use crate::backoff::*;
pub use crate::error::*;
pub use crate::futures::*;
pub use crate::generator::*;
pub use crate::journal::{FileJournal, Journal, NullJournal, Record};
pub use crate::refill::*;
pub use crate::registry::*;
pub use crate::status::*;
pub use crate::store::*;
pub use crate::value::*;

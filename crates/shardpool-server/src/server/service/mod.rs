//! HTTP service over a [`PoolAllocator`](shardpool::PoolAllocator).
//!
//! ## Structure
//!
//! - [`handler`] - request handlers and the [`ValueService`] router.
//!
//! [`ValueService`]: handler::ValueService

pub mod handler;

#[cfg(test)]
mod tests;

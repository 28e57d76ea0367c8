//! HTTP front end for [`shardpool`].
//!
//! Shared between the `shardpool-server` binary, which serves values over
//! HTTP, and the `shardpool-prefill` binary, which creates and fills the
//! partition and registry journals before the server is first started.

pub mod server;

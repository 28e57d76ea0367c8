mod runtime;
mod sleep_provider;
mod store;

pub use runtime::*;
pub use sleep_provider::*;
pub use store::*;

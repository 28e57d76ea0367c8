mod interface;
mod partition;
mod table;

pub use interface::*;
pub use partition::*;
pub(crate) use table::Table;

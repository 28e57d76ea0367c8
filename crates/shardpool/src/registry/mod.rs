mod interface;
mod kind_set;

pub use interface::*;
pub use kind_set::*;

mod interface;
mod scripted;
mod thread_random;

pub use interface::*;
pub use scripted::*;
pub use thread_random::*;

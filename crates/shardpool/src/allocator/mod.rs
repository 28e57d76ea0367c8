mod outcome;
mod policy;
mod pool;
mod state;

pub use outcome::*;
pub use policy::*;
pub use pool::*;
pub use state::*;

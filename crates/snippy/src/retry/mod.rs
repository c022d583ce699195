mod backoff;
mod breaker;
mod classifier;
mod connection;
mod policy;

pub use backoff::*;
pub use breaker::*;
pub use classifier::*;
pub use connection::*;
pub use policy::*;

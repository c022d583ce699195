mod short_id;
mod username;

pub use short_id::*;
pub use username::*;

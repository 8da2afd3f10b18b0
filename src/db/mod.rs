mod connection;
mod pool;
mod result;

pub use connection::*;
pub use pool::*;
pub use result::*;

mod bucket;
mod connection;
mod manager;
mod room;

pub use bucket::*;
pub use connection::*;
pub use manager::*;
pub use room::*;

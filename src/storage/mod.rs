mod cache;
mod durable;

pub use cache::*;
pub use durable::*;

mod client;
mod sanitize;
mod server;

pub use client::*;
pub use sanitize::*;
pub use server::*;

pub mod app;
pub mod cfg;
pub mod chain;
pub mod connect;
pub mod contracts;
pub mod error;
pub mod log;
pub mod program;
pub mod project;
pub mod rpc;
pub mod tx;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use services_common::TZ;

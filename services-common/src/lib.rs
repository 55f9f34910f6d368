pub mod cfg;
pub mod evm;
pub mod solana;
pub mod utils;

pub type TZ = chrono::Utc;

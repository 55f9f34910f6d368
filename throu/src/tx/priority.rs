//! Compute budget instructions for wallets that do not price transactions
//! themselves.

use crate::rpc::SolanaRpc;
use serde::Deserialize;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey,
};
use tracing::{debug, warn};

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct PriorityFeeConfig {
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    /// Added on top of the observed fee level.
    #[serde(default = "default_margin_percent")]
    pub margin_percent: u64,
    /// Percentile of recent non-zero fees to start from.
    #[serde(default = "default_percentile")]
    pub percentile: u8,
    #[serde(default = "default_fallback_micro_lamports")]
    pub fallback_micro_lamports: u64,
    #[serde(default = "default_max_micro_lamports")]
    pub max_micro_lamports: u64,
}

fn default_compute_unit_limit() -> u32 {
    200_000
}

fn default_margin_percent() -> u64 {
    10
}

fn default_percentile() -> u8 {
    75
}

fn default_fallback_micro_lamports() -> u64 {
    50_000
}

fn default_max_micro_lamports() -> u64 {
    5_000_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFee {
    pub compute_unit_limit: u32,
    pub micro_lamports_per_cu: u64,
}

impl PriorityFee {
    pub fn fallback(config: &PriorityFeeConfig) -> Self {
        Self {
            compute_unit_limit: config.compute_unit_limit,
            micro_lamports_per_cu: config.fallback_micro_lamports,
        }
    }

    /// Limit first, then price. Both go in front of the program instructions.
    pub fn instructions(&self) -> [Instruction; 2] {
        [
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(self.micro_lamports_per_cu),
        ]
    }
}

/// Fee level from recent samples, `None` when nothing was paid recently.
pub fn price_from_samples(samples: &[u64], config: &PriorityFeeConfig) -> Option<u64> {
    let mut paid = samples
        .iter()
        .copied()
        .filter(|fee| *fee > 0)
        .collect::<Vec<_>>();
    if paid.is_empty() {
        return None;
    }
    paid.sort_unstable();
    let percentile = usize::from(config.percentile.min(100));
    let base = paid[(paid.len() - 1) * percentile / 100];
    let with_margin = base.saturating_mul(100 + config.margin_percent) / 100;
    Some(with_margin.min(config.max_micro_lamports))
}

/// Estimates the fee for transactions writing `accounts`. Never fails, the
/// configured fallback is used when the node cannot tell.
pub async fn estimate<R: SolanaRpc + ?Sized>(
    rpc: &R,
    accounts: &[Pubkey],
    config: &PriorityFeeConfig,
) -> PriorityFee {
    match rpc.recent_prioritization_fees(accounts).await {
        Ok(samples) => match price_from_samples(&samples, config) {
            Some(price) => {
                debug!("priority fee {price} micro-lamports from {} samples", samples.len());
                PriorityFee {
                    compute_unit_limit: config.compute_unit_limit,
                    micro_lamports_per_cu: price,
                }
            }
            None => PriorityFee::fallback(config),
        },
        Err(err) => {
            warn!("priority fee estimation failed, using fallback: {err:#}");
            PriorityFee::fallback(config)
        }
    }
}

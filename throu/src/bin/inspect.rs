use serde::Deserialize;
use services_common::cfg::load_config;
use throu::{app::App, chain::ChainFamily, log::setup_log, wallet::WalletAddress};
use tracing::{info, warn};

#[derive(Deserialize, Debug, Clone)]
struct Config {
    #[serde(flatten)]
    app: throu::cfg::Config,
    inspect: InspectConfig,
}

#[derive(Deserialize, Debug, Clone)]
struct InspectConfig {
    chain: ChainFamily,
    project_ids: Vec<u64>,
    /// Address in the chain's native encoding.
    #[serde(default)]
    investor: Option<String>,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    setup_log();
    let cfg = load_config::<Config>()?;
    let inspect = cfg.inspect;
    let app = App::from_cfg(cfg.app)?;
    let investor = inspect
        .investor
        .as_deref()
        .map(|raw| WalletAddress::parse(inspect.chain, raw))
        .transpose()?;

    let records = app
        .reader
        .projects(inspect.chain, inspect.project_ids.iter().copied())
        .await?;
    if records.len() < inspect.project_ids.len() {
        warn!(
            "{} of {} projects do not exist on {}",
            inspect.project_ids.len() - records.len(),
            inspect.project_ids.len(),
            inspect.chain
        );
    }
    for record in records {
        info!("{}", serde_json::to_string_pretty(&record)?);
        if let Some(investor) = &investor {
            let position = app
                .reader
                .investor_position(inspect.chain, record.id, investor)
                .await?;
            info!("{}", serde_json::to_string_pretty(&position)?);
        }
    }
    Ok(())
}

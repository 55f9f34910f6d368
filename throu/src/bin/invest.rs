use anyhow::Context as _;
use serde::Deserialize;
use services_common::cfg::load_config;
use throu::{
    app::App, cfg::KeysConfig, chain::ChainFamily, log::setup_log,
    wallet::keypair::KeypairWallet,
};
use tracing::{error, info};

#[derive(Deserialize, Debug, Clone)]
struct Config {
    #[serde(flatten)]
    app: throu::cfg::Config,
    keys: KeysConfig,
    invest: InvestConfig,
}

#[derive(Deserialize, Debug, Clone)]
struct InvestConfig {
    project_id: u64,
    #[serde(flatten)]
    action: Action,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Action {
    Invest { shares: u64 },
    Withdraw,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    setup_log();
    let cfg = load_config::<Config>()?;
    let invest = cfg.invest;
    let app = App::from_cfg(cfg.app)?;
    let solana = app
        .solana
        .as_ref()
        .context("invest needs a solana section in config")?;
    let wallet = KeypairWallet::new(cfg.keys.investor);

    let attempt = match invest.action {
        Action::Invest { shares } => {
            solana
                .pipeline
                .invest(&wallet, invest.project_id, shares)
                .await
        }
        Action::Withdraw => solana.pipeline.withdraw(&wallet, invest.project_id).await,
    };
    let explorer = attempt
        .signature_or_hash
        .as_deref()
        .and_then(|signature| app.explorer_url(ChainFamily::Solana, signature));
    match &attempt.failure {
        None => info!("{} {} confirmed: {explorer:?}", attempt.kind, attempt.id),
        Some(failure) => {
            let presentation = failure.present(None);
            error!(
                "{} {} failed ({}): {}, tx {explorer:?}",
                attempt.kind, attempt.id, presentation.message, failure
            );
            anyhow::bail!("{failure}");
        }
    }
    Ok(())
}

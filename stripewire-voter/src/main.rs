use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use stripewire::voter::TcpConnectionFactory;
use stripewire::voter::VoterAgent;
use stripewire::voter::VoterMode;
use stripewire::voter::VoterOptions;
use stripewire::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = VoterOptions::parse();
    let config = Arc::new(Config::default().validate()?);

    let agent = VoterAgent::new(options.voter_id(), config, Arc::new(TcpConnectionFactory));

    match options.mode()? {
        VoterMode::Override(target) => {
            tracing::info!("casting manual override vote for {}", target);
            let accepted = agent.override_vote(&target).await?;
            if !accepted {
                bail!("override vote rejected by {}", target);
            }
            tracing::info!("override vote accepted by {}", target);
        }

        VoterMode::Monitor(targets) => {
            tracing::info!("monitoring {} stripe members", targets.len());
            agent.reconcile(targets.into_iter().collect());
            let _refresh = agent.start();

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            agent.deregister_all().await;
        }
    }

    Ok(())
}

//! Volume Bot - runs every configured trading personality side by side
//!
//! 1. Loads process settings from the environment (and `.env`)
//! 2. Loads one personality file per bot
//! 3. Gives each bot its own wallet, token cache and trading loop
//! 4. Stops all loops on Ctrl-C, saving caches on the way out

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use volume_bot::config::{BotConfig, Config};
use volume_bot::evm::EvmGateway;
use volume_bot::notifier::{LogNotifier, Notifier, WebhookConfig, WebhookNotifier};
use volume_bot::{BotRunner, ChainGateway, TokenCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Volume Bot...");

    let config = Config::from_env()?;
    info!(
        "Chain {} via {}, factory {}, {} bot file(s)",
        config.chain_id,
        config.rpc_url,
        config.factory_address,
        config.bot_configs.len()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for path in &config.bot_configs {
        let bot = match BotConfig::load(path) {
            Ok(bot) => bot,
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let name = bot.name.clone();
        let runner = match build_runner(&config, bot, shutdown_rx.clone()) {
            Ok(runner) => runner,
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let span = info_span!("bot", name = %name);
        handles.push(tokio::spawn(runner.run().instrument(span)));
    }

    if handles.is_empty() {
        anyhow::bail!("No bots could be started");
    }
    info!("{} bot(s) running", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping bots...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Bot stopped with error: {}", e),
            Err(e) => error!("Bot task panicked: {}", e),
        }
    }

    info!("All bots stopped");
    Ok(())
}

fn build_runner(config: &Config, bot: BotConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<BotRunner> {
    let key = bot.resolve_private_key()?;
    let gateway: Arc<dyn ChainGateway> = Arc::new(EvmGateway::new(
        &config.rpc_url,
        &config.factory_address,
        &key,
        config.chain_id,
    )?);

    let notifier: Arc<dyn Notifier> = match config.webhook_url {
        Some(ref url) => {
            let mut webhook = WebhookConfig::new(url, &config.bot_secret, &bot.display_name);
            webhook.avatar_url = bot.avatar_url.clone();
            webhook.bio = bot.bio.clone();
            webhook.wallet_address = Some(gateway.wallet_address());
            Arc::new(WebhookNotifier::new(webhook)?)
        }
        None => {
            warn!("WEBHOOK_URL not set, {} will only log its events", bot.name);
            Arc::new(LogNotifier)
        }
    };

    let mut cache = TokenCache::load(&config.cache_dir, &bot.name, bot.cache.cache_duration_hours);
    if config.force_cache_refresh {
        cache.force_refresh();
    }

    info!("{} ready with wallet {}", bot.display_name, gateway.wallet_address());
    Ok(BotRunner::new(bot, gateway, notifier, cache, shutdown))
}

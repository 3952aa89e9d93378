//! SlotPay node: builds the engine from environment configuration and runs
//! the background jobs until interrupted.
//!
//! Components are constructed once here and passed by reference — there are
//! no process-global singletons. Jobs whose external prerequisites are not
//! configured (deposit wallets, wallet signer, verification chat) are simply
//! not scheduled, and that decision is logged at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use slotpay_chain::{
    BotApiContent, ChainClient, EventFeed, HttpWalletClient, NotificationSink, NullNotifier,
    TelegramNotifier, TonApiFeed,
};
use slotpay_ledger::{BalanceLedger, OrderEscrow};
use slotpay_settlement::{
    DeliveryVerifier, DepositScanner, EscrowApi, RetryPacing, Scheduler, TxRecordStore,
    WalletRegistry, WithdrawalSettler,
};
use slotpay_types::{constants, Currency, EngineConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Assemble the engine configuration from the environment.
fn load_config() -> EngineConfig {
    let mut config = EngineConfig::default();

    if let Some(base) = env_opt("SLOTPAY_TONAPI_BASE") {
        config.chain.tonapi_base = base;
    }
    config.chain.api_key = env_opt("SLOTPAY_TONAPI_KEY");
    config.chain.signer_base = env_opt("SLOTPAY_SIGNER_BASE");
    if let Some(base) = env_opt("SLOTPAY_EXPLORER_BASE") {
        config.chain.explorer_base = base;
    }

    config.deposits.token_wallet = env_opt("SLOTPAY_TOKEN_DEPOSIT_WALLET");
    config.deposits.native_wallet = env_opt("SLOTPAY_NATIVE_DEPOSIT_WALLET");
    config.deposits.interval_secs =
        env_parse("SLOTPAY_DEPOSIT_INTERVAL_SECS", config.deposits.interval_secs);

    config.withdrawals.hot_wallet = env_opt("SLOTPAY_HOT_WALLET");
    config.withdrawals.interval_secs = env_parse(
        "SLOTPAY_WITHDRAWAL_INTERVAL_SECS",
        config.withdrawals.interval_secs,
    );
    config.withdrawals.batch_size =
        env_parse("SLOTPAY_WITHDRAWAL_BATCH_SIZE", config.withdrawals.batch_size);

    config.verifier.verification_chat = env_opt("SLOTPAY_VERIFICATION_CHAT")
        .and_then(|value| value.parse().ok());
    config.verifier.interval_secs =
        env_parse("SLOTPAY_VERIFY_INTERVAL_SECS", config.verifier.interval_secs);

    config.notify.bot_token = env_opt("SLOTPAY_BOT_TOKEN");

    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if not found).
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    info!(
        version = constants::VERSION,
        "{} node starting",
        constants::ENGINE_NAME
    );

    let config = load_config();

    // Core state, constructed once and shared by reference.
    let ledger = Arc::new(BalanceLedger::new());
    let escrow = Arc::new(OrderEscrow::new());
    let records = Arc::new(TxRecordStore::new());
    let wallets = Arc::new(WalletRegistry::new());

    let feed: Arc<dyn EventFeed> = Arc::new(TonApiFeed::new(&config.chain));
    let notifier: Arc<dyn NotificationSink> =
        match TelegramNotifier::new(&config.notify, config.chain.explorer_base.clone()) {
            Some(notifier) => Arc::new(notifier),
            None => {
                warn!("bot token not configured, notifications disabled");
                Arc::new(NullNotifier)
            }
        };
    let content = Arc::new(BotApiContent::new(
        config.notify.bot_token.clone().unwrap_or_default(),
        config.verifier.verification_chat,
    ));

    // The typed operations surface; the HTTP route layer (out of tree)
    // mounts on top of this.
    let _api = Arc::new(EscrowApi::new(
        Arc::clone(&ledger),
        Arc::clone(&escrow),
        Arc::clone(&records),
        Arc::clone(&wallets),
        content.clone(),
        config.withdrawals.clone(),
    ));

    let mut scheduler = Scheduler::new();
    let deposit_period = Duration::from_secs(config.deposits.interval_secs);

    // Token deposits: memo-attributed.
    if let Some(wallet) = &config.deposits.token_wallet {
        let scanner = Arc::new(DepositScanner::memo_attributed(
            Arc::clone(&feed),
            Arc::clone(&records),
            Arc::clone(&ledger),
            Arc::clone(&notifier),
            wallet.clone(),
            config.deposits.scan_limit,
        ));
        scheduler.spawn("token-deposit-scan", deposit_period, move || {
            let scanner = Arc::clone(&scanner);
            async move {
                if let Err(e) = scanner.scan().await {
                    warn!(error = %e, "token deposit scan failed");
                }
            }
        });
    } else {
        info!("token deposit wallet not configured, scanner disabled");
    }

    // Native deposits: sender-attributed via linked wallets.
    if let Some(wallet) = &config.deposits.native_wallet {
        let scanner = Arc::new(DepositScanner::sender_attributed(
            Arc::clone(&feed),
            Arc::clone(&records),
            Arc::clone(&ledger),
            Arc::clone(&notifier),
            Arc::clone(&wallets),
            wallet.clone(),
            config.deposits.scan_limit,
        ));
        scheduler.spawn("native-deposit-scan", deposit_period, move || {
            let scanner = Arc::clone(&scanner);
            async move {
                if let Err(e) = scanner.scan().await {
                    warn!(error = %e, "native deposit scan failed");
                }
            }
        });
    } else {
        info!("native deposit wallet not configured, scanner disabled");
    }

    // Withdrawal settlers, one per withdrawable asset.
    let hot_wallet = config
        .withdrawals
        .hot_wallet
        .clone()
        .or_else(|| config.deposits.token_wallet.clone())
        .or_else(|| config.deposits.native_wallet.clone());
    match (&config.chain.signer_base, hot_wallet) {
        (Some(_), Some(hot_wallet)) => {
            let client: Arc<dyn ChainClient> = Arc::new(
                HttpWalletClient::new(&config.chain)
                    .context("wallet signer client construction")?,
            );
            let withdraw_period = Duration::from_secs(config.withdrawals.interval_secs);
            for currency in [Currency::Usdt, Currency::Ton] {
                let settler = Arc::new(WithdrawalSettler::new(
                    Arc::clone(&records),
                    Arc::clone(&ledger),
                    Arc::clone(&client),
                    Arc::clone(&feed),
                    Arc::clone(&notifier),
                    currency,
                    hot_wallet.clone(),
                    config.withdrawals.batch_size,
                    RetryPacing::default(),
                ));
                let name: &'static str = match currency {
                    Currency::Usdt => "usdt-withdrawal-settle",
                    _ => "ton-withdrawal-settle",
                };
                scheduler.spawn(name, withdraw_period, move || {
                    let settler = Arc::clone(&settler);
                    async move {
                        settler.settle_pending().await;
                    }
                });
            }
        }
        _ => info!("wallet signer or hot wallet not configured, withdrawals disabled"),
    }

    // Delivery verification.
    if config.verifier.verification_chat.is_some() && config.notify.bot_token.is_some() {
        let verifier = Arc::new(DeliveryVerifier::new(
            Arc::clone(&escrow),
            content.clone(),
            Arc::clone(&notifier),
        ));
        scheduler.spawn(
            "delivery-verify",
            Duration::from_secs(config.verifier.interval_secs),
            move || {
                let verifier = Arc::clone(&verifier);
                async move {
                    verifier.verify_due(chrono::Utc::now()).await;
                }
            },
        );
    } else {
        info!("verification chat not configured, delivery verifier disabled");
    }

    info!(jobs = scheduler.job_count(), "engine running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    scheduler.shutdown().await;
    info!("node stopped");
    Ok(())
}

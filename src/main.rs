// region:    --- Imports
use market_auction_service::auction::engine::AuctionEngine;
use market_auction_service::clock::SystemClock;
use market_auction_service::config::Config;
use market_auction_service::database::DatabaseManager;
use market_auction_service::handlers;
use market_auction_service::ledger::{ClerkLedger, CoinLedger, MemoryLedger};
use market_auction_service::message_broker::{KafkaFanOut, KafkaProducer};
use market_auction_service::realtime::{BackgroundFanOut, FanOutGroup, RealtimeHub};
use market_auction_service::scheduler::SettlementScheduler;
use market_auction_service::state::AppState;
use market_auction_service::store::{AuctionStore, ItemStore, MemoryStore, PgStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
// endregion: --- Imports

const MIRROR_QUEUE: usize = 1024;

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::load()?;

    // storage: PostgreSQL when configured, otherwise in-process
    let (store, items): (Arc<dyn AuctionStore>, Arc<dyn ItemStore>) = match &config.database_url
    {
        Some(url) => {
            let db_manager =
                Arc::new(DatabaseManager::connect(url, config.db_max_connections).await?);
            if let Err(e) = db_manager.initialize_database().await {
                error!("{:<12} --> Database initialization failed: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> Database initialized", "Main");
            let pg = Arc::new(PgStore::new(db_manager));
            (
                pg.clone() as Arc<dyn AuctionStore>,
                pg as Arc<dyn ItemStore>,
            )
        }
        None => {
            warn!(
                "{:<12} --> DATABASE_URL not set, using in-memory store",
                "Main"
            );
            let memory = Arc::new(MemoryStore::new());
            (
                memory.clone() as Arc<dyn AuctionStore>,
                memory as Arc<dyn ItemStore>,
            )
        }
    };

    let ledger: Arc<dyn CoinLedger> = match &config.clerk_secret_key {
        Some(secret) => Arc::new(ClerkLedger::new(&config.clerk_api_url, secret)),
        None => {
            warn!(
                "{:<12} --> CLERK_SECRET_KEY not set, using in-memory ledger",
                "Main"
            );
            Arc::new(MemoryLedger::new())
        }
    };

    let hub = Arc::new(RealtimeHub::new());
    let mut fanout = FanOutGroup::new().with(hub.clone());
    if let Some(brokers) = &config.kafka_brokers {
        let producer = KafkaProducer::new(brokers)?;
        producer.create_topic(&config.kafka_topic, 5, 1).await?;
        let mirror = Arc::new(KafkaFanOut::new(producer, &config.kafka_topic));
        fanout = fanout.with(Arc::new(BackgroundFanOut::spawn(mirror, MIRROR_QUEUE)));
        info!(
            "{:<12} --> Mirroring events to Kafka topic {}",
            "Main", config.kafka_topic
        );
    }

    let engine = Arc::new(AuctionEngine::new(
        store,
        items,
        ledger,
        Arc::new(fanout),
        Arc::new(SystemClock),
        config.auction.clone(),
    ));

    let scheduler = Arc::new(SettlementScheduler::new(
        engine.clone(),
        Duration::from_millis(config.settlement_grace_ms),
        chrono::Duration::seconds(config.stalled_settlement_secs),
    ));
    scheduler.restore().await?;
    scheduler.start_sweep(Duration::from_secs(config.sweep_interval_secs));

    let routes_all = handlers::router(AppState {
        engine,
        scheduler,
        hub,
    });

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main

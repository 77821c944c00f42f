use adcast::assignment::AssignmentEngine;
use adcast::cli::{ChannelCommands, Cli, Commands};
use adcast::config::AppConfig;
use adcast::dispatch::{DeliveryPipeline, DispatchOutcome, Scheduler, SummaryBroadcaster};
use adcast::domain::NewChannel;
use adcast::error::{AdcastError, Result};
use adcast::store::{PostgresStore, RecordStore};
use adcast::transport::TelegramBot;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Configuration: {}", e);
        }
        return Err(AdcastError::Validation(format!(
            "invalid configuration ({} errors)",
            errors.len()
        )));
    }

    match cli.command {
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await?;
        }
        Commands::Run { no_assign, paused } => {
            run_mode(&config, no_assign, paused).await?;
        }
        Commands::Dispatch { listing_id } => {
            let store = connect(&config).await?;
            let transport = Arc::new(TelegramBot::new(&config.telegram)?);
            let pipeline = DeliveryPipeline::new(store, transport, &config)?;
            let report = pipeline.dispatch(listing_id).await?;
            print_dispatch_report(&report.outcome, listing_id);
        }
        Commands::AssignListings => {
            let store = connect(&config).await?;
            let engine = AssignmentEngine::new(store);
            let assigned = engine.sweep_listings().await?;
            println!("Assigned {} listings", assigned.len());
            for (listing_id, agent_id) in assigned {
                println!("  listing {listing_id} -> agent {agent_id}");
            }
        }
        Commands::AssignOrders => {
            let store = connect(&config).await?;
            let engine = AssignmentEngine::new(store);
            let assigned = engine.sweep_orders().await?;
            println!("Assigned {} orders", assigned.len());
            for (order_id, lead_id) in assigned {
                println!("  order {order_id} -> team lead {lead_id}");
            }
        }
        Commands::Summary => {
            let store = connect(&config).await?;
            let transport = Arc::new(TelegramBot::new(&config.telegram)?);
            let broadcaster = SummaryBroadcaster::new(store, transport);
            let report = broadcaster.send_daily_summary().await?;
            println!(
                "Published today: {} | channels notified: {} | failed: {}",
                report.published_today, report.notified, report.failed
            );
        }
        Commands::Channels { command } => {
            let store = connect(&config).await?;
            run_channel_command(&store, command).await?;
        }
        Commands::SetStatus { listing_id, status } => {
            let store = connect(&config).await?;
            store.set_listing_status(listing_id, status).await?;
            println!(
                "Listing {} status set to {}",
                listing_id,
                status.map(|s| s.to_string()).unwrap_or_else(|| "<none>".into())
            );

            // Status changes feed straight back into distribution
            let transport = Arc::new(TelegramBot::new(&config.telegram)?);
            let pipeline = DeliveryPipeline::new(store, transport, &config)?;
            let report = pipeline.dispatch(listing_id).await?;
            print_dispatch_report(&report.outcome, listing_id);
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> Result<Arc<PostgresStore>> {
    Ok(Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    ))
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_dispatch_report(outcome: &DispatchOutcome, listing_id: i64) {
    match outcome {
        DispatchOutcome::Delivered { succeeded, failed } => println!(
            "Listing {listing_id}: delivered to {succeeded} channels, {failed} failed"
        ),
        DispatchOutcome::AlreadyInFlight => {
            println!("Listing {listing_id}: already being dispatched, skipped")
        }
        DispatchOutcome::NoEligibleChannels => {
            println!("Listing {listing_id}: no eligible channels")
        }
    }
}

async fn run_mode(config: &AppConfig, no_assign: bool, paused: bool) -> Result<()> {
    let store = connect(config).await?;
    store.migrate().await?;

    let transport = Arc::new(TelegramBot::new(&config.telegram)?);
    let pipeline = Arc::new(DeliveryPipeline::new(store.clone(), transport, config)?);
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        pipeline,
        config.scheduler.clone(),
        config.matching.clone(),
    ));

    scheduler.start();
    let handle = scheduler.handle();
    if paused {
        handle.pause();
    }

    if !no_assign {
        let engine = AssignmentEngine::new(store);
        let sweep_handle = handle.clone();
        let interval_secs = config.scheduler.assign_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            while sweep_handle.is_running() {
                interval.tick().await;
                if let Err(e) = engine.sweep_listings().await {
                    error!("Listing assignment sweep failed: {}", e);
                }
                if let Err(e) = engine.sweep_orders().await {
                    error!("Order assignment sweep failed: {}", e);
                }
            }
        });
    }

    signal::ctrl_c().await?;
    info!("Shutting down");
    handle.stop();

    let stats = scheduler.stats().await;
    info!(
        "Scheduler stats: {} ticks, {} dispatched, {} skipped, {} failures",
        stats.ticks, stats.dispatched, stats.skipped_in_flight, stats.failures
    );
    Ok(())
}

async fn run_channel_command(store: &Arc<PostgresStore>, command: ChannelCommands) -> Result<()> {
    match command {
        ChannelCommands::List => {
            let channels = store.channels().await?;
            println!("{} channels configured", channels.len());
            for ch in channels {
                println!(
                    "  #{} {} {}/{} chat={} price={:?}..{:?} location={}",
                    ch.id,
                    ch.category,
                    ch.deal_type,
                    ch.object_type,
                    ch.chat_id,
                    ch.price_from,
                    ch.price_to,
                    ch.location
                );
            }
        }
        ChannelCommands::Add {
            category,
            deal_type,
            object_type,
            chat_id,
            price_from,
            price_to,
            location,
        } => {
            let id = store
                .add_channel(&NewChannel {
                    category,
                    deal_type,
                    object_type,
                    chat_id,
                    price_from,
                    price_to,
                    location,
                })
                .await?;
            println!("Channel {id} added");
        }
        ChannelCommands::Remove { channel_id } => {
            store.remove_channel(channel_id).await?;
            println!("Channel {channel_id} removed");
        }
    }
    Ok(())
}

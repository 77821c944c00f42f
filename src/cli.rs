use crate::domain::{ChannelCategory, ListingStatus, LocationFilter};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "adcast",
    about = "Real-estate listing broadcast dispatcher",
    version
)]
pub struct Cli {
    /// Configuration directory
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler loop and assignment sweeps
    Run {
        /// Disable the periodic assignment sweeps
        #[arg(long)]
        no_assign: bool,
        /// Start with auto-posting paused
        #[arg(long)]
        paused: bool,
    },
    /// Dispatch a single listing to its eligible channels now
    Dispatch {
        listing_id: i64,
    },
    /// Assign all unassigned listings to agents round-robin
    AssignListings,
    /// Assign all unassigned orders to team leads round-robin
    AssignOrders,
    /// Send the daily summary to all channels
    Summary,
    /// Manage distribution channels
    Channels {
        #[command(subcommand)]
        command: ChannelCommands,
    },
    /// Set a listing's status and re-dispatch it
    SetStatus {
        listing_id: i64,
        /// New status; omit to clear
        #[arg(long)]
        status: Option<ListingStatus>,
    },
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum ChannelCommands {
    /// List configured channels
    List,
    /// Add a channel
    Add {
        #[arg(long)]
        category: ChannelCategory,
        #[arg(long)]
        deal_type: String,
        #[arg(long)]
        object_type: String,
        #[arg(long)]
        chat_id: String,
        /// Inclusive lower USD bound
        #[arg(long)]
        price_from: Option<i64>,
        /// Inclusive upper USD bound
        #[arg(long)]
        price_to: Option<i64>,
        #[arg(long, default_value = "all")]
        location: LocationFilter,
    },
    /// Remove a channel
    Remove {
        channel_id: i64,
    },
}

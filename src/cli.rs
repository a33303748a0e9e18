use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nexa_sync::document::PAGE_CHAR_BUDGET;

#[derive(Parser)]
#[command(name = "nexa-sync")]
#[command(about = "Live sync and streaming client for the Nexa multi-agent backend", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Config file (default: $NEXA_CONFIG, then ./nexa-sync.json)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Connection profile; overrides NEXA_PROFILE
    #[arg(long, global = true, value_parser = ["desktop", "browser"])]
    pub(crate) profile: Option<String>,
    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long, global = true)]
    pub(crate) backend: Option<String>,
    /// Socket URL; derived from the backend URL when omitted
    #[arg(long, global = true)]
    pub(crate) ws_url: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Subscribe to the socket and print every event.
    Watch {
        /// Stop after this many seconds (default: run until the reconnect budget is spent)
        #[arg(long)]
        seconds: Option<u64>,
        /// Print raw {type, data} frames
        #[arg(long)]
        json: bool,
    },

    /// Stream a research request and print the paginated document.
    Research {
        message: String,
        /// Existing document to expand (sent as research_data)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Continue from the backend's current research document
        #[arg(long, conflicts_with = "data")]
        resume: bool,
        /// Abort the request after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Page budget in characters
        #[arg(long, default_value_t = PAGE_CHAR_BUDGET)]
        budget: usize,
        /// Output JSON (pages and footnotes)
        #[arg(long)]
        json: bool,
    },

    /// Send a project chat message and follow the agents over the socket.
    Project {
        message: String,
        /// Give up waiting for completion after this many seconds
        #[arg(long, default_value_t = 180)]
        seconds: u64,
    },

    /// Fetch and print the canvas snapshot.
    Canvas {
        /// Output JSON (canvas and summary)
        #[arg(long)]
        json: bool,
    },

    /// Clean, footnote and paginate a document offline.
    Paginate {
        file: PathBuf,
        /// Fact-check text to extract footnotes from
        #[arg(long)]
        fact_check: Option<PathBuf>,
        #[arg(long, default_value_t = PAGE_CHAR_BUDGET)]
        budget: usize,
        /// Output JSON pages
        #[arg(long)]
        json: bool,
    },
}

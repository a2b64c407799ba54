use crate::core::SortOrder;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatvault")]
#[command(author, version, about = "Owner-scoped chat history with full-text search", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the search index schema if it is missing
    InitIndex,

    /// Start a new chat session
    Create {
        #[arg(short, long)]
        owner: i64,

        #[arg(short, long)]
        title: Option<String>,

        /// First message of the session
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Append a message to an existing session
    Append {
        #[arg(short, long)]
        owner: i64,

        #[arg(short, long)]
        session: i64,

        #[arg(short, long)]
        content: String,

        /// Record the message as sent by the assistant
        #[arg(long)]
        assistant: bool,
    },

    /// List or search an owner's sessions
    List {
        #[arg(short, long)]
        owner: i64,

        #[arg(short, long)]
        page: Option<u32>,

        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(short, long)]
        keyword: Option<String>,

        /// Inclusive, YYYY-MM-DD
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Inclusive, YYYY-MM-DD
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// newest or oldest
        #[arg(long)]
        sort: Option<SortOrder>,

        /// Print the raw response envelope
        #[arg(long)]
        json: bool,
    },

    /// Show a session with its messages
    Show {
        #[arg(short, long)]
        owner: i64,

        #[arg(short, long)]
        session: i64,

        #[arg(long)]
        json: bool,
    },
}

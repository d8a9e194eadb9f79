use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mp3-pipeline")]
#[command(author, version, about = "Queue-driven video to MP3 conversion pipeline")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the upload gateway
    Gateway {
        /// Port to listen on (defaults to APP_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Consume the video queue and publish finished MP3s
    Converter,

    /// Consume the mp3 queue and notify uploaders
    Notifier,

    /// Check that required external tools are available
    CheckTools,
}

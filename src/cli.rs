use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harcurl")]
#[command(about = "Find the request behind a browser action in a HAR capture and turn it into curl.")]
#[command(version)]
pub struct Cli {
    /// Extra config file, merged after the discovered ones
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service (upload, analyze, execute)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Maximum capture upload size (e.g., "150MB", "1.5M", "unlimited")
        #[arg(long)]
        max_upload_size: Option<String>,

        /// TLS certificate (PEM)
        #[arg(long)]
        tls_cert: Option<PathBuf>,

        /// TLS private key (PEM)
        #[arg(long)]
        tls_key: Option<PathBuf>,

        /// Seconds an uploaded capture stays available
        #[arg(long, value_name = "SECONDS")]
        session_ttl: Option<u64>,

        /// Matcher model identifier
        #[arg(long)]
        model: Option<String>,
    },

    /// Filter a capture and show what was removed
    Filter {
        /// HAR file to read
        file: PathBuf,

        /// Output as JSON (stats, breakdown and kept entries)
        #[arg(long)]
        json: bool,
    },

    /// Print the summary the matcher sees for a capture
    Summarize {
        /// HAR file to read
        file: PathBuf,

        /// List every entry instead of collapsing repeated endpoints
        #[arg(long)]
        no_dedup: bool,
    },

    /// Print the curl command for one entry
    Curl {
        /// HAR file to read
        file: PathBuf,

        /// 0-based position of the entry in the capture
        #[arg(long)]
        index: usize,

        /// Show sensitive header values instead of [REDACTED]
        #[arg(long)]
        no_redact: bool,
    },

    /// Print the resolved configuration
    Config,

    /// Generate shell completions
    #[cfg(feature = "completions")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

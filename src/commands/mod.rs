mod config;
mod curl;
mod filter;
mod serve;
mod summarize;

pub use config::run_config;
pub use curl::{run_curl, CurlCommandOptions};
pub use filter::{run_filter, FilterOptions};
pub use serve::{handle_request, run_serve, ServeOptions, ServeState};
pub use summarize::{run_summarize, SummarizeOptions};

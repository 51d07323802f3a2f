use std::env;
use std::process;
use std::time::Duration;

use clap::Parser;
#[cfg(feature = "completions")]
use clap::CommandFactory;
use tracing_subscriber::EnvFilter;

use harcurl::commands::{
    run_config, run_curl, run_filter, run_serve, run_summarize, CurlCommandOptions, FilterOptions,
    ServeOptions, SummarizeOptions,
};
use harcurl::config::{load_config, ResolvedConfig};
use harcurl::error::{HarcurlError, Result};
use harcurl::matcher::HttpMatcherOptions;
use harcurl::replay::ReplaySettings;
use harcurl::size::parse_size_bytes;

mod cli;

use cli::{Cli, Commands};

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    let result = (|| -> Result<()> {
        let config = load_config(cli.config.as_deref())?;
        let resolved = ResolvedConfig::from_config(&config);
        init_tracing(&resolved.logging.filter);

        match cli.command {
            Commands::Serve {
                bind,
                port,
                max_upload_size,
                tls_cert,
                tls_key,
                session_ttl,
                model,
            } => {
                let options = serve_options(
                    &resolved,
                    bind,
                    port,
                    max_upload_size,
                    tls_cert,
                    tls_key,
                    session_ttl,
                    model,
                )?;
                run_serve(&options)
            }

            Commands::Filter { file, json } => run_filter(file, &FilterOptions { json }),

            Commands::Summarize { file, no_dedup } => run_summarize(
                file,
                &SummarizeOptions {
                    deduplicate: !no_dedup,
                },
            ),

            Commands::Curl {
                file,
                index,
                no_redact,
            } => run_curl(
                file,
                &CurlCommandOptions {
                    index,
                    redact: !no_redact,
                },
            ),

            Commands::Config => run_config(&resolved),

            #[cfg(feature = "completions")]
            Commands::Completions { shell } => {
                let mut cmd = Cli::command();
                clap_complete::generate(shell, &mut cmd, "harcurl", &mut std::io::stdout());
                Ok(())
            }
        }
    })();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn serve_options(
    resolved: &ResolvedConfig,
    bind: Option<String>,
    port: Option<u16>,
    max_upload_size: Option<String>,
    tls_cert: Option<std::path::PathBuf>,
    tls_key: Option<std::path::PathBuf>,
    session_ttl: Option<u64>,
    model: Option<String>,
) -> Result<ServeOptions> {
    let server = &resolved.server;
    let max_upload_size = max_upload_size.unwrap_or_else(|| server.max_upload_size.clone());
    let matcher = &resolved.matcher;
    let replay = &resolved.replay;

    if matcher.timeout_secs == 0 || replay.timeout_secs == 0 {
        return Err(HarcurlError::InvalidArgs(
            "matcher and replay timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(ServeOptions {
        bind: bind.unwrap_or_else(|| server.bind.clone()),
        port: port.unwrap_or(server.port),
        max_upload_bytes: parse_size_bytes(&max_upload_size)?,
        tls_cert: tls_cert.or_else(|| server.tls_cert.clone()),
        tls_key: tls_key.or_else(|| server.tls_key.clone()),
        session_ttl: Duration::from_secs(session_ttl.unwrap_or(resolved.session.ttl_secs)),
        sweep_interval: Duration::from_secs(resolved.session.sweep_interval_secs),
        matcher: HttpMatcherOptions {
            endpoint: matcher.endpoint.clone(),
            model: model.unwrap_or_else(|| matcher.model.clone()),
            api_key: env::var(&matcher.api_key_env).ok().filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(matcher.timeout_secs),
            max_tokens: matcher.max_tokens,
        },
        replay: ReplaySettings {
            timeout: Duration::from_secs(replay.timeout_secs),
            max_response_bytes: parse_size_bytes(&replay.max_response_size)?,
        },
    })
}

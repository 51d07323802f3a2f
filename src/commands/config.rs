use crate::config::{render_config, ResolvedConfig};
use crate::error::Result;

/// Print the effective configuration as TOML.
pub fn run_config(config: &ResolvedConfig) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

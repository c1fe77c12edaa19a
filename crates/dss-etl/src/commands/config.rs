//! `dss-etl config` command implementation

use crate::config::ExtractorConfig;
use crate::error::Result;

/// Print the effective configuration as TOML
pub async fn show(config: &ExtractorConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

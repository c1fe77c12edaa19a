//! `dss-etl status` command implementation
//!
//! Shows what the staging directory currently holds.

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::progress::format_bytes;
use crate::staging::StagingLayout;
use colored::Colorize;

pub async fn run(config: &ExtractorConfig) -> Result<()> {
    let layout = StagingLayout::new(&config.staging_dir);
    let stats = layout.stats().await?;

    println!("{}", "Staging Directory:".cyan().bold());
    println!("  Path:      {}", layout.root().display());
    println!("  Manifests: {}", stats.manifests);
    println!("  Files:     {} ({})", stats.files, format_bytes(stats.file_bytes));
    println!("  Bundles:   {}", stats.bundles);

    if stats.manifests == 0 && stats.files == 0 {
        println!();
        println!("Nothing staged yet. Run 'dss-etl extract' to fetch bundles.");
    }

    Ok(())
}

//! `dss-etl materialize` command implementation

use crate::bundle::BundleId;
use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::extractor::Extractor;
use colored::Colorize;

/// Materialize one bundle and report what was fetched
pub async fn run(config: ExtractorConfig, fqid: &str) -> Result<()> {
    let bundle = BundleId::parse_fqid(fqid)?;
    let extractor = Extractor::new(config)?;

    println!("{} Materializing {}...", "↓".cyan(), bundle);
    let result = extractor.materialize(&bundle).await?;

    println!(
        "{} {}: {} fetched, {} reused, {} skipped",
        "✓".green(),
        bundle,
        result.fetched_files.len(),
        result.reused_files,
        result.skipped_files
    );

    let view = extractor.layout().bundle_dir(&bundle);
    if tokio::fs::try_exists(&view).await? {
        println!("  View:     {}", view.display());
    } else {
        println!("  No files matched the selection patterns");
    }
    println!("  Manifest: {}", result.manifest_path.display());

    Ok(())
}

//! `dss-etl clean` command implementation
//!
//! Bundle views are derived data and can always be rebuilt from the
//! content store. `--all` also drops manifests and stored files.

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::progress::format_bytes;
use crate::staging::StagingLayout;
use colored::Colorize;
use tracing::info;

pub async fn run(config: &ExtractorConfig, all: bool) -> Result<()> {
    let layout = StagingLayout::new(&config.staging_dir);

    if all {
        let stats = layout.stats().await?;
        layout.clean_all().await?;
        info!(staging = %layout.root().display(), "Removed staging directory");

        println!(
            "{} Removed {} manifest(s), {} file(s) and {} bundle view(s)",
            "✓".green(),
            stats.manifests,
            stats.files,
            stats.bundles
        );
        println!("  Freed: {}", format_bytes(stats.file_bytes));
    } else {
        let removed = layout.clean_views().await?;
        println!("{} Removed {} bundle view(s)", "✓".green(), removed);
        println!("Use --all to also remove cached manifests and files");
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clean_keeps_store_unless_all() {
        let temp = TempDir::new().unwrap();
        let config = ExtractorConfig::new(temp.path().join("staging"));
        let layout = StagingLayout::new(&config.staging_dir);
        tokio::fs::create_dir_all(layout.bundles_dir().join("b1.v1")).await.unwrap();
        tokio::fs::create_dir_all(layout.files_dir()).await.unwrap();
        tokio::fs::write(layout.files_dir().join("f1.v1"), b"{}").await.unwrap();

        run(&config, false).await.unwrap();
        assert!(!layout.bundles_dir().exists());
        assert!(layout.files_dir().join("f1.v1").exists());

        run(&config, true).await.unwrap();
        assert!(!layout.root().exists());
    }
}

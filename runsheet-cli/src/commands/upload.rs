use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;

use crate::config::CliConfig;

pub async fn handle_upload_command(config: &CliConfig, path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }

    let client = config.api_client()?;
    let url = client
        .upload_file(path)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;

    println!("{} Uploaded {}", "✓".green().bold(), path.display());
    println!("  {} {}", "→".blue(), url.cyan());
    println!(
        "  {} {}{}",
        "→".blue(),
        config.server_url().trim_end_matches('/'),
        url
    );
    Ok(())
}

//! Scan-status command handler

use crate::config::Config;
use crate::domain::PathStatus;
use crate::services::MediaReconciler;

pub async fn cmd_scan(config: &Config) -> anyhow::Result<()> {
    if config.library.search_paths.is_empty() {
        println!("No search paths configured.");
        println!();
        println!("Add one with: subtitlarr scan --path /media/tv");
        return Ok(());
    }

    let paths = config.library.search_paths.clone();
    let languages = config.library.language_set();
    let results = tokio::task::spawn_blocking(move || {
        MediaReconciler::default().scan_status(&paths, &languages)
    })
    .await?;

    println!("Languages: {}", config.library.language_set());
    println!("{:-<70}", "");

    for status in &results {
        match status {
            PathStatus::Scanned {
                path,
                videos,
                missing,
            } => println!("{path}: {videos} video(s), {missing} missing subtitle(s)"),
            PathStatus::Error { path, error } => println!("{path}: ERROR {error}"),
        }
    }

    Ok(())
}

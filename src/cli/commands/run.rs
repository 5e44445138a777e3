//! Foreground run command handler

use std::time::Duration;

use crate::config::Config;
use crate::domain::{RunOutcome, TriggerSource};
use crate::services::LogSink;
use crate::state::SharedState;

pub async fn cmd_run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let state = SharedState::new(config, None)?;
    let sink = LogSink::new(state.event_bus.clone())
        .with_progress()
        .start_listener();

    let summary = state
        .coordinator
        .run_to_completion(TriggerSource::Cli)
        .await;

    // Closing the bus lets the sink drain what is left and stop.
    drop(state);
    let _ = tokio::time::timeout(Duration::from_secs(5), sink).await;

    let Some(summary) = summary else {
        anyhow::bail!("A run is already in progress");
    };

    println!();
    println!("{:-<70}", "");
    println!("Run complete!");
    println!("  Videos:  {}", summary.total_videos);
    println!("  Saved:   {}", summary.saved_count);
    println!("  Errors:  {}", summary.failed_videos);

    if let RunOutcome::Failed(reason) = summary.outcome {
        anyhow::bail!("Run failed: {reason}");
    }

    Ok(())
}

//! Sync command handler

use anyhow::{Context, Result};

use justshop_core::Remote;

use crate::app::App;
use crate::output::Output;

/// Fetch the server's list once and make the local copy match it
pub async fn sync(app: &App, output: &Output) -> Result<()> {
    output.message(&format!("Fetching list from {}...", app.config.server_url));

    let snapshot = app
        .remote
        .fetch_snapshot()
        .await
        .context("Failed to fetch the list from the server")?;

    let outcome = app
        .engine
        .apply_snapshot(snapshot)
        .await
        .context("Failed to update the local list")?;

    output.success(&format!(
        "Sync complete - {} item(s), {} removed locally",
        app.engine.items().len(),
        outcome.removed
    ));
    Ok(())
}

/// Sync quietly before read commands; failures only produce a warning
pub async fn sync_quiet(app: &App, output: &Output) {
    let result = async {
        let snapshot = app.remote.fetch_snapshot().await?;
        app.engine.apply_snapshot(snapshot).await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = result {
        output.warn(&format!("Showing local list, sync failed: {}", e));
    }
}

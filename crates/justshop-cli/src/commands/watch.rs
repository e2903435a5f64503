//! Watch command handler
//!
//! Runs the engine in the foreground and redraws the list whenever an
//! observer fires.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;

use crate::app::App;
use crate::output::{Output, OutputFormat};

/// Follow the list until Ctrl-C
pub async fn watch(app: &App, output: &Output) -> Result<()> {
    let changed = Arc::new(Notify::new());
    let notifier = Arc::clone(&changed);
    let observer = app.engine.register_observer(move || notifier.notify_one());

    let handle = app.start()?;
    output.message(&format!(
        "Watching {} (Ctrl-C to stop)",
        app.config.server_url
    ));
    render(app, output);

    loop {
        tokio::select! {
            _ = changed.notified() => render(app, output),
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    app.engine.unregister_observer(observer);
    app.finish(handle, output).await;
    Ok(())
}

fn render(app: &App, output: &Output) {
    let items = app.engine.items();
    let connected = app.engine.is_connected();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "connected": connected,
                    "status": app.engine.status(),
                    "items": items
                })
            );
        }
        OutputFormat::Human => {
            println!();
            println!("── {} ──", if connected { "online" } else { "offline" });
            output.print_items(&items);
        }
        OutputFormat::Quiet => {}
    }
}

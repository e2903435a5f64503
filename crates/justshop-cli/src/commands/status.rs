//! Status command handler

use anyhow::Result;
use serde::Serialize;

use crate::app::App;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Serialize)]
struct StatusReport {
    server_url: String,
    authenticated: bool,
    sync_interval_secs: u64,
    database: String,
    items: usize,
    checked: usize,
}

impl StatusReport {
    fn collect(app: &App) -> Self {
        let items = app.engine.items();
        let config = &app.config;
        Self {
            server_url: config.server_url.clone(),
            authenticated: !config.username.is_empty() && !config.password.is_empty(),
            sync_interval_secs: config.sync_interval().as_secs(),
            database: config.sqlite_path().display().to_string(),
            items: items.len(),
            checked: items.iter().filter(|i| i.checked).count(),
        }
    }
}

/// Show status information
pub fn show(app: &App, output: &Output) -> Result<()> {
    let report = StatusReport::collect(app);

    match output.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Quiet => println!("{}", report.items),
        OutputFormat::Human => {
            println!("JustShop Status");
            println!("===============");
            println!();
            println!("Server:");
            println!("  URL:           {}", report.server_url);
            println!(
                "  Auth:          {}",
                if report.authenticated {
                    "basic"
                } else {
                    "anonymous"
                }
            );
            println!("  Poll interval: {}s", report.sync_interval_secs);
            println!();
            println!("Storage:");
            println!("  Database: {}", report.database);
            println!();
            println!("Contents:");
            println!("  Items:   {}", report.items);
            println!("  Checked: {}", report.checked);
        }
    }

    Ok(())
}

//! Wiring shared by the commands that touch the list

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use uuid::Uuid;

use justshop_core::sync::SyncOptions;
use justshop_core::{Config, HttpRemote, Item, ItemRepository, SharedSettings, SyncEngine, SyncHandle};

use crate::output::Output;

pub struct App {
    pub config: Config,
    pub repo: Arc<ItemRepository>,
    pub remote: Arc<HttpRemote>,
    pub engine: SyncEngine,
}

impl App {
    /// Open the local database and set up the engine (not started)
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.sqlite_path();
        let repo = ItemRepository::open(&db_path)
            .inspect_err(|e| {
                if let Some(hint) = e.hint() {
                    eprintln!("hint: {}", hint);
                }
            })
            .with_context(|| format!("Failed to open item database {:?}", db_path))?;
        let repo = Arc::new(repo);

        let settings = Arc::new(SharedSettings::new(config.clone()));
        let remote =
            Arc::new(HttpRemote::new(settings.clone()).context("Failed to set up HTTP client")?);

        let engine = SyncEngine::new(
            Arc::clone(&repo),
            remote.clone(),
            settings,
            SyncOptions::from_config(&config),
        );

        Ok(Self {
            config,
            repo,
            remote,
            engine,
        })
    }

    pub fn start(&self) -> Result<SyncHandle> {
        Ok(self.engine.start()?)
    }

    /// Shut the engine down so queued requests go out, and report leftovers
    pub async fn finish(&self, handle: SyncHandle, output: &Output) {
        handle.shutdown().await;

        let pending = self.engine.pending_outbound();
        if pending > 0 {
            output.warn(&format!(
                "{} change(s) saved locally but not sent to {}; the next server update will replace them",
                pending, self.config.server_url
            ));
        }
    }

    /// Find an item by full id or unique id prefix
    pub fn resolve_item(&self, id: &str) -> Result<Item> {
        if let Ok(uuid) = Uuid::parse_str(id) {
            return self
                .repo
                .get(uuid)?
                .ok_or_else(|| anyhow!("No item found with ID: {}", id));
        }

        let matches = self.repo.find_by_prefix(id)?;
        match matches.as_slice() {
            [] => bail!("No item found matching: {}", id),
            [item] => Ok(item.clone()),
            _ => {
                eprintln!("Multiple items match '{}':", id);
                for item in &matches {
                    eprintln!("  {} - {}", item.id, item.content);
                }
                bail!("Ambiguous ID. Please provide more characters.");
            }
        }
    }
}

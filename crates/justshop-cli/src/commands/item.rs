//! Item command handlers
//!
//! Edits land in the local database first. The engine then runs just long
//! enough to send them to the server.

use anyhow::{Context, Result};

use crate::app::App;
use crate::output::Output;
use crate::prompt::confirm;

/// Show the local list
pub fn list(app: &App, output: &Output) -> Result<()> {
    output.print_items(&app.engine.items());
    Ok(())
}

/// Add a new item
pub async fn add(app: &App, content: String, output: &Output) -> Result<()> {
    let handle = app.start()?;
    let item = app.engine.add(content).await.context("Failed to add item")?;
    app.finish(handle, output).await;

    output.success(&format!("Added: {}", item.content));
    output.print_item(&item);
    Ok(())
}

/// Tick an item off or back on
pub async fn set_checked(app: &App, id: String, checked: bool, output: &Output) -> Result<()> {
    let item = app.resolve_item(&id)?;
    if item.checked == checked {
        output.message(&format!(
            "'{}' is already {}",
            item.content,
            if checked { "checked" } else { "unchecked" }
        ));
        return Ok(());
    }

    let handle = app.start()?;
    let updated = item.with_checked(checked);
    app.engine
        .update(updated.clone())
        .await
        .context("Failed to update item")?;
    app.finish(handle, output).await;

    output.success(&format!(
        "{} '{}'",
        if checked { "Checked" } else { "Unchecked" },
        updated.content
    ));
    Ok(())
}

/// Change an item's text
pub async fn edit(app: &App, id: String, content: String, output: &Output) -> Result<()> {
    let item = app.resolve_item(&id)?;

    let handle = app.start()?;
    let updated = item.with_content(content);
    app.engine
        .update(updated.clone())
        .await
        .context("Failed to update item")?;
    app.finish(handle, output).await;

    output.success(&format!("Updated item {}", updated.id));
    output.print_item(&updated);
    Ok(())
}

/// Remove all checked items
pub async fn delete_checked(app: &App, output: &Output) -> Result<()> {
    let handle = app.start()?;
    let removed = app
        .engine
        .delete_checked()
        .await
        .context("Failed to delete checked items")?;
    app.finish(handle, output).await;

    output.success(&format!("Removed {} checked item(s)", removed));
    Ok(())
}

/// Remove every item
pub async fn clear(app: &App, yes: bool, output: &Output) -> Result<()> {
    let count = app.engine.items().len();
    if !yes && output.should_prompt() {
        let prompt = format!("Remove all {} item(s) for everyone sharing this list?", count);
        if !confirm(&prompt)? {
            output.message("Cancelled.");
            return Ok(());
        }
    } else if !yes {
        anyhow::bail!("Refusing to clear the list without --yes");
    }

    let handle = app.start()?;
    let removed = app
        .engine
        .delete_all()
        .await
        .context("Failed to clear the list")?;
    app.finish(handle, output).await;

    output.success(&format!("Removed {} item(s)", removed));
    Ok(())
}

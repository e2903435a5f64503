//! Terminal rendering for items and command feedback
//!
//! `--json` prints machine-readable documents on stdout, `--quiet` prints
//! ids only, and everything else is for people.

use chrono::{Local, TimeZone};
use serde::Serialize;

use justshop_core::Item;

const LINE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

impl OutputFormat {
    /// `--quiet` wins over `--json`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (_, true) => OutputFormat::Quiet,
            (true, false) => OutputFormat::Json,
            (false, false) => OutputFormat::Human,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Confirmation prompts only make sense for a person at the terminal
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn print_item(&self, item: &Item) {
        match self.format {
            OutputFormat::Human => {
                println!("{}", format_item_line(item));
                println!("    id      {}", item.id);
                println!("    changed {}", format_timestamp(item.timestamp));
            }
            OutputFormat::Json => print_json(item),
            OutputFormat::Quiet => println!("{}", item.id),
        }
    }

    pub fn print_items(&self, items: &[Item]) {
        match self.format {
            OutputFormat::Human if items.is_empty() => println!("Nothing on the list."),
            OutputFormat::Human => {
                items
                    .iter()
                    .for_each(|item| println!("{}", format_item_line(item)));
                let done = items.iter().filter(|item| item.checked).count();
                println!("\n{} to buy, {} in the basket", items.len() - done, done);
            }
            OutputFormat::Json => print_json(items),
            OutputFormat::Quiet => items.iter().for_each(|item| println!("{}", item.id)),
        }
    }

    pub fn success(&self, text: &str) {
        self.note("ok", "✓ ", text);
    }

    pub fn message(&self, text: &str) {
        self.note("info", "", text);
    }

    /// Goes to stderr so it never mixes with `--json` documents
    pub fn warn(&self, text: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", text);
        }
    }

    fn note(&self, kind: &str, marker: &str, text: &str) {
        match self.format {
            OutputFormat::Human => println!("{}{}", marker, text),
            OutputFormat::Json => println!("{}", serde_json::json!({ "kind": kind, "message": text })),
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Could not encode JSON: {}", e),
    }
}

/// `[x] 1a2b3c4d  Milk`
fn format_item_line(item: &Item) -> String {
    let mark = if item.checked { 'x' } else { ' ' };
    let id = item.id.simple().to_string();
    format!("[{}] {}  {}", mark, &id[..8], clip(&item.content, LINE_WIDTH))
}

fn format_timestamp(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Shorten to `width` characters, ending in "..." when cut
fn clip(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        None => text.to_string(),
        Some(_) => {
            let head: String = text.chars().take(width.saturating_sub(3)).collect();
            head + "..."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_quiet_beats_json() {
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("Milk", 10), "Milk");
        assert_eq!(clip("exactly10!", 10), "exactly10!");
        assert_eq!(clip("free range eggs, large", 10), "free ra...");
        assert_eq!(clip("äöüäöüäöüäöü", 6), "äöü...");
    }

    #[test]
    fn test_item_line() {
        let id = Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000000").unwrap();
        let item = Item::with_id(id, "Milk", false, 0);
        assert_eq!(format_item_line(&item), "[ ] 1a2b3c4d  Milk");
        assert_eq!(
            format_item_line(&item.with_checked(true)),
            "[x] 1a2b3c4d  Milk"
        );
    }

    #[test]
    fn test_prompt_only_for_humans() {
        assert!(Output::new(OutputFormat::Human).should_prompt());
        assert!(!Output::new(OutputFormat::Json).should_prompt());
        assert!(!Output::new(OutputFormat::Quiet).should_prompt());
    }
}

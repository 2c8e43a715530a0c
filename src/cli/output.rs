//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::{BucketLabel, Buckets};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// One table for all three buckets, low first
pub fn buckets_table(buckets: &Buckets) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Bucket").add_attribute(Attribute::Bold),
            Cell::new("Label").add_attribute(Attribute::Bold),
            Cell::new("Bias").add_attribute(Attribute::Bold),
            Cell::new("Significance").add_attribute(Attribute::Bold),
            Cell::new("Perspective").add_attribute(Attribute::Bold),
        ]);

    for label in BucketLabel::ALL {
        for point in buckets.get(label) {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(&point.label),
                Cell::new(format!("{:.3}", point.x())).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3}", point.y())).set_alignment(CellAlignment::Right),
                Cell::new(truncate(&point.text, 80)),
            ]);
        }
    }
    table
}

//! Renders a `Table` as a terminal table for `fia-cli` (spec.md §0 "Crate
//! shape"). Kept out of the library's estimator path entirely — nothing
//! under `estimators` or `aggregate` ever prints; only the CLI binary calls
//! this.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, ContentArrangement, Table as ComfyTable};

use crate::output::formatter::Table;

pub fn render(title: &str, table: &Table) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", title.bold().green()));
    out.push_str(&format!("{}\n", "=".repeat(title.len().max(20))));

    let mut ct = ComfyTable::new();
    ct.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS).set_content_arrangement(ContentArrangement::Dynamic);

    let headers: Vec<&str> = table.schema().names().iter().map(|s| s.as_str()).collect();
    ct.set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());

    for r in 0..table.num_rows() {
        let row: Vec<Cell> = table.schema().names().iter().map(|name| Cell::new(table.get(r, name).to_string())).collect();
        ct.add_row(row);
    }

    out.push_str(&format!("{ct}"));
    out
}

pub fn print(title: &str, table: &Table) {
    println!("{}", render(title, table));
}

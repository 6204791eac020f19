use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

use crate::core::types::{LeaderboardEntry, TransactionRecord};

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Value,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Value => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Renders a league leaderboard as a table.
pub fn leaderboard_table(league_id: &str, entries: &[LeaderboardEntry]) -> String {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Rank"),
        header_cell("Member"),
        header_cell("Total Value"),
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.rank).set_alignment(CellAlignment::Right),
            Cell::new(&entry.user_id),
            Cell::new(format!("{:.2}", entry.total_value)).set_alignment(CellAlignment::Right),
        ]);
    }

    format!(
        "Leaderboard: {}\n\n{}",
        style_text(league_id, StyleType::Title),
        table
    )
}

/// One-line trade confirmation for the demo feed.
pub fn trade_line(owner: &str, transaction: &TransactionRecord) -> String {
    format!(
        "{} {} {} x {} @ {} -> cash {}",
        style_text(owner, StyleType::Subtle),
        transaction.side,
        transaction.shares,
        transaction.symbol,
        transaction.price,
        style_text(&format!("{:.2}", transaction.cash_after), StyleType::Value),
    )
}

use tabled::{settings::Style, Table, Tabled};

use crate::export::ExportHeader;
use crate::storage::sqlite::DbStats;

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    name: String,
    #[tabled(rename = "Schema")]
    schema: String,
    #[tabled(rename = "Rows")]
    rows: String,
}

fn render(rows: Vec<TableRow>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Manifest of an export, one line per table with its declared row count
pub fn header_table(header: &ExportHeader) -> String {
    render(
        header
            .tables
            .iter()
            .map(|t| TableRow {
                name: t.name.clone(),
                schema: t.schema.clone(),
                rows: t.row_count.to_string(),
            })
            .collect(),
    )
}

/// Stored tables of a database with their actual row counts
pub fn stats_table(stats: &DbStats) -> String {
    render(
        stats
            .tables
            .iter()
            .map(|t| TableRow {
                name: t.name.clone(),
                schema: t.schema.clone(),
                rows: t.rows.to_string(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::TableSchema;

    #[test]
    fn test_header_table() {
        let header = ExportHeader {
            format_name: "dexie".into(),
            format_version: 1,
            database_name: "app".into(),
            database_version: 1.0,
            tables: vec![TableSchema::new("friends", "++id,name", 42)],
        };
        let rendered = header_table(&header);
        assert!(rendered.contains("friends"));
        assert!(rendered.contains("++id,name"));
        assert!(rendered.contains("42"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = DbStats {
            name: "app".into(),
            version: 1.0,
            tables: Vec::new(),
        };
        assert_eq!(stats_table(&stats), "");
    }
}

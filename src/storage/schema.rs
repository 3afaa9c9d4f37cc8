//! Database schema definitions

/// SQL to create the database metadata table
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// SQL to create the declared-tables registry
pub const CREATE_TABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _tables (
    name TEXT PRIMARY KEY,
    schema TEXT NOT NULL
)
"#;

/// Metadata keys
pub const META_NAME: &str = "name";
pub const META_VERSION: &str = "version";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_META_TABLE, CREATE_TABLES_TABLE]
}

/// Quoted SQL identifier of the data table backing a declared table
pub fn data_table(name: &str) -> String {
    format!("\"rows:{}\"", name.replace('"', "\"\""))
}

/// SQL to create the data table of a declared table.
/// Keys are canonical JSON text; rowid keeps insertion order.
pub fn create_data_table(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        data_table(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_table_quoting() {
        assert_eq!(data_table("friends"), "\"rows:friends\"");
        assert_eq!(data_table("we\"ird"), "\"rows:we\"\"ird\"");
    }
}

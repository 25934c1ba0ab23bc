use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to encode output: {e}"))
}

/// Print a serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    println!("{}", to_pretty_json(value)?);
    Ok(())
}

/// Render tabular data in the requested format.
pub fn render_rows(columns: &[&str], rows: &[Vec<String>], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(columns);
            for row in rows {
                table.add_row(row);
            }
            Ok(table.to_string())
        }
        OutputFormat::Json => {
            let json_rows: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let mut map = serde_json::Map::new();
                    for (i, col) in columns.iter().enumerate() {
                        map.insert(
                            (*col).to_string(),
                            serde_json::Value::String(row.get(i).cloned().unwrap_or_default()),
                        );
                    }
                    serde_json::Value::Object(map)
                })
                .collect();
            to_pretty_json(&json_rows)
        }
        OutputFormat::Csv => {
            let mut out = columns.join(",");
            for row in rows {
                out.push('\n');
                out.push_str(&row.join(","));
            }
            Ok(out)
        }
    }
}

pub fn print_rows(columns: &[&str], rows: &[Vec<String>], format: OutputFormat) -> Result<(), String> {
    println!("{}", render_rows(columns, rows, format)?);
    Ok(())
}

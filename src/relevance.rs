//! Relevance filtering: narrow the full schema to what a question needs.
//!
//! The generator is asked for a schema excerpt, but its answer is never
//! trusted as-is. The sanitizer keeps only tables and columns that exist in
//! the live snapshot, resolves near-miss names by string similarity, and
//! re-renders the surviving subset through the canonical formatter. When
//! nothing in the answer maps onto the snapshot, the full description is
//! used instead. The output is advisory either way; the safety gate further
//! down is the authoritative guard.

use crate::catalog::{SchemaSnapshot, TableDescriptor};
use crate::error::Result;
use crate::llm::TextGenerator;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::{debug, warn};

const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

lazy_static! {
    // "Tabla:" included because models drift into the question's language.
    static ref TABLE_LINE: Regex = Regex::new(r"(?i)^\s*tab(?:le|la)\s*:\s*(\S+)").unwrap();
    static ref COLUMN_LINE: Regex = Regex::new(r"^\s*-\s*([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

pub struct RelevanceFilter {
    llm: Arc<dyn TextGenerator>,
}

impl RelevanceFilter {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Ask the generator for a schema excerpt and sanitize it against the
    /// live snapshot. A transport failure of the backend is terminal.
    pub async fn filter(&self, question: &str, schema: &SchemaSnapshot) -> Result<String> {
        let prompt = build_filter_prompt(question, schema);
        let response = self.llm.generate(&prompt).await?;
        Ok(sanitize_excerpt(&response, schema))
    }
}

fn build_filter_prompt(question: &str, schema: &SchemaSnapshot) -> String {
    format!(
        r#"You are a PostgreSQL expert. Below is the full schema of a database, followed by a question.

=== DATABASE SCHEMA ===
{}

=== TASK ===
List ONLY the tables and columns that are relevant to answer the question.
- Use exactly the same format as the schema above: a "Table: name" line, then one "  - column (type)" line per column.
- Copy table and column names exactly as they appear in the schema. Do not invent anything.
- Leave out every table that is not needed.
- Do not write anything else.

QUESTION: "{}"
"#,
        schema.describe(),
        question
    )
}

/// Strip everything the snapshot does not actually contain and re-render
/// the rest. Falls back to the full description when nothing survives.
fn sanitize_excerpt(response: &str, schema: &SchemaSnapshot) -> String {
    let kept = parse_excerpt(response, schema);
    if kept.is_empty() {
        warn!("Relevance filter output matched no known table, using full schema");
        return schema.describe();
    }

    debug!(
        "Relevance filter kept {} of {} tables",
        kept.len(),
        schema.tables.len()
    );
    SchemaSnapshot { tables: kept }.describe()
}

fn parse_excerpt(response: &str, schema: &SchemaSnapshot) -> Vec<TableDescriptor> {
    // Resolved table name plus the resolved columns mentioned under it.
    let mut seen: Vec<(String, Vec<String>)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in response.lines() {
        if let Some(caps) = TABLE_LINE.captures(line) {
            let raw = trim_identifier(&caps[1]);
            current = match resolve_name(raw, schema.tables.iter().map(|t| t.name.as_str())) {
                Some(name) => match seen.iter().position(|(t, _)| *t == name) {
                    Some(idx) => Some(idx),
                    None => {
                        seen.push((name, Vec::new()));
                        Some(seen.len() - 1)
                    }
                },
                None => {
                    warn!("Relevance filter mentioned unknown table '{}'", raw);
                    None
                }
            };
        } else if let Some(caps) = COLUMN_LINE.captures(line) {
            if let Some(idx) = current {
                let (table_name, cols) = &mut seen[idx];
                if let Some(table) = schema.table(table_name.as_str()) {
                    let raw = trim_identifier(&caps[1]);
                    if let Some(name) =
                        resolve_name(raw, table.columns.iter().map(|c| c.name.as_str()))
                    {
                        if !cols.contains(&name) {
                            cols.push(name);
                        }
                    }
                }
            }
        }
    }

    seen.into_iter()
        .filter_map(|(table_name, cols)| {
            let table = schema.table(&table_name)?;
            // No recognizable columns means keep the whole table. Column
            // order always follows the catalog, not the model's answer.
            let columns = if cols.is_empty() {
                table.columns.clone()
            } else {
                table
                    .columns
                    .iter()
                    .filter(|c| cols.contains(&c.name))
                    .cloned()
                    .collect()
            };
            Some(TableDescriptor {
                name: table.name.clone(),
                columns,
            })
        })
        .collect()
}

fn trim_identifier(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
}

/// Exact match first, then the best similarity match above the threshold.
fn resolve_name<'a, I>(raw: &str, known: I) -> Option<String>
where
    I: Iterator<Item = &'a str>,
{
    let raw_lower = raw.to_lowercase();
    let mut best: Option<(f64, &str)> = None;

    for name in known {
        let name_lower = name.to_lowercase();
        if name_lower == raw_lower {
            return Some(name.to_string());
        }
        let score = jaro_winkler(&raw_lower, &name_lower);
        if score >= NAME_SIMILARITY_THRESHOLD && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, name));
        }
    }

    best.map(|(score, name)| {
        debug!("Resolved '{}' to '{}' (similarity {:.2})", raw, name, score);
        name.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, ForeignKeyRef};

    fn billing_schema() -> SchemaSnapshot {
        let column = |name: &str, data_type: &str, nullable: bool| ColumnDescriptor {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            is_primary: false,
            foreign_key: None,
        };

        SchemaSnapshot {
            tables: vec![
                TableDescriptor {
                    name: "clientes".to_string(),
                    columns: vec![column("id", "uuid", false), column("cli_nombre", "text", true)],
                },
                TableDescriptor {
                    name: "facturas".to_string(),
                    columns: vec![
                        ColumnDescriptor {
                            name: "id".to_string(),
                            data_type: "integer".to_string(),
                            nullable: false,
                            is_primary: true,
                            foreign_key: None,
                        },
                        column("monto", "numeric", true),
                        ColumnDescriptor {
                            name: "cliente_id".to_string(),
                            data_type: "uuid".to_string(),
                            nullable: true,
                            is_primary: false,
                            foreign_key: Some(ForeignKeyRef {
                                referenced_table: "clientes".to_string(),
                                referenced_column: "id".to_string(),
                            }),
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn keeps_only_existing_tables() {
        let schema = billing_schema();
        let response = "Table: facturas\n  - monto (numeric)\n\nTable: pagos\n  - amount (numeric)\n";
        let excerpt = sanitize_excerpt(response, &schema);

        assert!(excerpt.contains("Table: facturas"));
        assert!(excerpt.contains("monto"));
        assert!(!excerpt.contains("pagos"));
    }

    #[test]
    fn near_miss_table_name_resolves() {
        let schema = billing_schema();
        let response = "Table: factura\n  - monto (numeric)\n";
        let excerpt = sanitize_excerpt(response, &schema);
        assert!(excerpt.contains("Table: facturas"));
    }

    #[test]
    fn unknown_columns_are_dropped() {
        let schema = billing_schema();
        let response = "Table: facturas\n  - monto (numeric)\n  - made_up (text)\n";
        let excerpt = sanitize_excerpt(response, &schema);
        assert!(excerpt.contains("monto"));
        assert!(!excerpt.contains("made_up"));
    }

    #[test]
    fn table_without_recognized_columns_keeps_all() {
        let schema = billing_schema();
        let response = "Table: clientes\n";
        let excerpt = sanitize_excerpt(response, &schema);
        assert!(excerpt.contains("cli_nombre"));
        assert!(excerpt.contains("id"));
    }

    #[test]
    fn unusable_answer_falls_back_to_full_schema() {
        let schema = billing_schema();
        let excerpt = sanitize_excerpt("I am not sure which tables you mean.", &schema);
        assert_eq!(excerpt, schema.describe());
    }

    #[test]
    fn spanish_header_is_recognized() {
        let schema = billing_schema();
        let response = "Tabla: facturas\n  - monto (numeric)\n";
        let excerpt = sanitize_excerpt(response, &schema);
        assert!(excerpt.contains("Table: facturas"));
    }

    #[test]
    fn column_order_follows_catalog() {
        let schema = billing_schema();
        // Model lists columns in its own order; the rendered excerpt keeps
        // catalog order (id before monto).
        let response = "Table: facturas\n  - monto (numeric)\n  - id (integer)\n";
        let excerpt = sanitize_excerpt(response, &schema);
        let id_pos = excerpt.find("- id").unwrap();
        let monto_pos = excerpt.find("- monto").unwrap();
        assert!(id_pos < monto_pos);
    }
}

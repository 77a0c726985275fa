//! Schema catalog types shared by every pipeline stage.
//!
//! A snapshot is rebuilt from the live database on every run and never
//! cached, so prompts always describe the schema as it currently is.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

/// One table with its columns in catalog ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// All base tables of the public schema, ordered by table name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Render the snapshot in the canonical text format every prompt embeds.
    /// The relevance sanitizer re-renders its filtered subset through this
    /// same formatter, so prompt assembly stays uniform.
    pub fn describe(&self) -> String {
        self.tables.iter().map(|t| t.describe()).join("\n\n")
    }
}

impl TableDescriptor {
    pub fn describe(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let null_marker = if col.nullable { ", nullable" } else { "" };
                let mut line = format!("  - {} ({}{})", col.name, col.data_type, null_marker);
                if col.is_primary {
                    line.push_str(" [PRIMARY KEY]");
                }
                if let Some(fk) = &col.foreign_key {
                    line.push_str(&format!(
                        " [FK → {}.{}]",
                        fk.referenced_table, fk.referenced_column
                    ));
                }
                line
            })
            .join("\n");

        format!("Table: {}\n{}", self.name, columns)
    }
}

/// Pass-through listing of the schema for UI consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableListing {
    pub name: String,
    pub column_count: usize,
    pub columns: Vec<ColumnListing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnListing {
    pub name: String,
    pub data_type: String,
    pub is_primary: bool,
    pub is_foreign: bool,
}

impl TableListing {
    pub fn from_descriptor(table: &TableDescriptor) -> Self {
        Self {
            name: table.name.clone(),
            column_count: table.columns.len(),
            columns: table
                .columns
                .iter()
                .map(|col| ColumnListing {
                    name: col.name.clone(),
                    data_type: col.data_type.clone(),
                    is_primary: col.is_primary,
                    is_foreign: col.foreign_key.is_some(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            tables: vec![TableDescriptor {
                name: "recibos".to_string(),
                columns: vec![
                    ColumnDescriptor {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                        is_primary: true,
                        foreign_key: None,
                    },
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
            }],
        }
    }

    #[test]
    fn describe_renders_markers() {
        let text = sample_snapshot().describe();
        assert!(text.starts_with("Table: recibos\n"));
        assert!(text.contains("  - id (integer) [PRIMARY KEY]"));
        assert!(text.contains("  - cliente_id (uuid, nullable) [FK → clientes.id]"));
    }

    #[test]
    fn listing_reflects_constraints() {
        let snapshot = sample_snapshot();
        let listing = TableListing::from_descriptor(&snapshot.tables[0]);
        assert_eq!(listing.column_count, 2);
        assert!(listing.columns[0].is_primary);
        assert!(!listing.columns[0].is_foreign);
        assert!(listing.columns[1].is_foreign);
    }
}

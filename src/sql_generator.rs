//! Query synthesis: natural-language question in, single SQL statement out.

use crate::catalog::SchemaSnapshot;
use crate::error::{NlqError, Result};
use crate::llm::TextGenerator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

lazy_static! {
    static ref FENCED_SQL: Regex = Regex::new(r"(?s)```sql\n(.*?)\n```").unwrap();
    static ref BARE_SELECT: Regex = Regex::new(r"(?i)SELECT[^;]*").unwrap();
}

/// Synthesized SQL with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub question: String,
    pub relevance: Option<String>,
}

pub struct SqlGenerator {
    llm: Arc<dyn TextGenerator>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Build the generation prompt, call the backend and extract exactly one
    /// SQL statement from its free-text answer.
    pub async fn synthesize(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        relevance: Option<&str>,
    ) -> Result<GeneratedQuery> {
        let prompt = build_generation_prompt(question, schema, relevance);
        let response = self.llm.generate(&prompt).await?;
        let sql = extract_sql(&response)?;
        info!("Synthesized SQL: {}", sql);

        Ok(GeneratedQuery {
            sql,
            question: question.to_string(),
            relevance: relevance.map(|r| r.to_string()),
        })
    }
}

fn build_generation_prompt(
    question: &str,
    schema: &SchemaSnapshot,
    relevance: Option<&str>,
) -> String {
    let schema_description = match relevance {
        Some(excerpt) if !excerpt.trim().is_empty() => excerpt.to_string(),
        _ => schema.describe(),
    };

    format!(
        r#"You are a PostgreSQL expert. Convert the following question into a valid SQL query.

=== DATABASE SCHEMA ===
{schema_description}

=== IMPORTANT RULES ===
1. Use SELECT queries only. Never INSERT, UPDATE, DELETE, DROP, TRUNCATE, CREATE, ALTER or EXEC.
2. If the query may return many rows, add LIMIT 100 at the end.
3. Use table and column names exactly as they appear in the schema.
4. For dates, use native PostgreSQL functions such as NOW(), DATE_PART(), EXTRACT().
5. For amounts or quantities use aggregate functions such as SUM(), MAX(), MIN(), AVG(), COUNT().
   - When grouping is requested, use GROUP BY correctly.
6. Use JOINs only when needed, based on the relationships between tables.
7. Respect column nullability:
   - If a column is marked nullable, add WHERE column IS NOT NULL before filtering on it.
   - Otherwise use it directly.
8. If the question asks to group results (by customer, by month, by category), you MUST use GROUP BY on that column.
   - Include in the SELECT only the grouping column and aggregates over other columns.
   - Never mix in non-grouped columns.
9. Do not invent tables or columns that are not in the schema.
10. Round every computed numeric value with ROUND(value, 2) by default.
    - If another precision is explicitly requested, use ROUND(value, N).
11. Use lowercase snake_case aliases only.
12. CTEs (WITH ...) are allowed when they make the query clearer or more exact.
13. Avoid comments in the generated query; when unavoidable, use -- only.

=== OUTPUT INSTRUCTIONS ===
- Return ONLY the SQL query, formatted with line breaks and indentation for readability.
- Do not explain the query. It must be ready to run on PostgreSQL.

QUESTION: "{question}"
"#
    )
}

/// Fenced ```sql block first, bare SELECT as fallback. A candidate with an
/// interior statement separator is more than one statement and is rejected.
fn extract_sql(response: &str) -> Result<String> {
    let candidate = if let Some(caps) = FENCED_SQL.captures(response) {
        caps.get(1).map(|m| m.as_str()).unwrap_or_default()
    } else if let Some(m) = BARE_SELECT.find(response) {
        m.as_str()
    } else {
        return Err(NlqError::Synthesis(
            "No SQL statement could be extracted from the generated response".to_string(),
        ));
    };

    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(NlqError::Synthesis(
            "No SQL statement could be extracted from the generated response".to_string(),
        ));
    }

    if let Some(pos) = candidate.find(';') {
        if !candidate[pos + 1..].trim().is_empty() {
            return Err(NlqError::Synthesis(
                "Generated response contains more than one SQL statement".to_string(),
            ));
        }
    }

    Ok(candidate.to_string())
}

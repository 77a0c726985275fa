//! Natural-language explanation of generated queries and schemas.

use crate::catalog::SchemaSnapshot;
use crate::error::Result;
use crate::llm::TextGenerator;
use std::sync::Arc;

pub struct ExplanationEngine {
    llm: Arc<dyn TextGenerator>,
}

impl ExplanationEngine {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Summarize what the query does and what it found. The count is the
    /// full result count, taken before the caller-facing truncation.
    pub async fn explain(&self, question: &str, sql: &str, result_count: usize) -> Result<String> {
        let prompt = build_explanation_prompt(question, sql, result_count);
        self.llm.generate(&prompt).await
    }

    /// Narrative description of the whole schema.
    pub async fn summarize_schema(&self, schema: &SchemaSnapshot) -> Result<String> {
        let prompt = format!(
            r#"Here is the database schema:

{}

Provide a summary of:
1. Which tables exist and what data they contain
2. The main relationships between tables
3. The kinds of queries that can be answered
4. Examples of useful questions to ask

Answer clearly and concisely.
"#,
            schema.describe()
        );
        self.llm.generate(&prompt).await
    }
}

fn build_explanation_prompt(question: &str, sql: &str, result_count: usize) -> String {
    format!(
        r#"Original question: "{question}"
Generated SQL query: {sql}
Number of results: {result_count}

Explain what this query does and summarize the main results clearly and concisely.

Example explanation:
"This query looks for the invoice with the highest amount in the database. It found X results, the highest being the invoice of customer Y with an amount of Z."

Explanation:
"#
    )
}

//! Pipeline orchestration: a question goes in, a structured outcome comes
//! out. Stage failures never escape as errors; they are folded into the
//! outcome so callers always receive a well-formed result.

use crate::catalog::TableListing;
use crate::db::schema_repo::SchemaReader;
use crate::error::Result;
use crate::executor::{QueryExecutor, QueryResult, RowMap, TabularBackend};
use crate::explain::ExplanationEngine;
use crate::llm::TextGenerator;
use crate::observability::logger::{RunLog, RunLogEntry};
use crate::relevance::RelevanceFilter;
use crate::sql_generator::SqlGenerator;
use crate::sql_guard::SqlGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Hard cap on rows exposed to callers, independent of any LIMIT inside
/// the statement itself.
pub const MAX_RESULT_ROWS: usize = 50;

/// The externally visible unit of work. A non-empty error always comes
/// with empty SQL and empty results; failure is total for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub question: String,
    pub sql_query: String,
    pub explanation: String,
    pub results: Vec<RowMap>,
    pub truncated: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl PipelineOutcome {
    fn success(
        question: String,
        sql_query: String,
        explanation: String,
        result: QueryResult,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            question,
            sql_query,
            explanation,
            results: result.rows,
            truncated: result.truncated,
            error: None,
            elapsed_ms,
        }
    }

    fn failure(question: String, error: String, elapsed_ms: u64) -> Self {
        Self {
            question,
            sql_query: String::new(),
            explanation: String::new(),
            results: Vec::new(),
            truncated: false,
            error: Some(error),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct NlqPipeline {
    schema: Arc<dyn SchemaReader>,
    relevance: RelevanceFilter,
    generator: SqlGenerator,
    guard: SqlGuard,
    executor: QueryExecutor,
    explainer: ExplanationEngine,
    run_log: Arc<RunLog>,
}

impl NlqPipeline {
    pub fn new(
        schema: Arc<dyn SchemaReader>,
        llm: Arc<dyn TextGenerator>,
        backend: Arc<dyn TabularBackend>,
    ) -> Self {
        Self {
            schema,
            relevance: RelevanceFilter::new(llm.clone()),
            generator: SqlGenerator::new(llm.clone()),
            guard: SqlGuard::new(),
            executor: QueryExecutor::new(backend),
            explainer: ExplanationEngine::new(llm),
            run_log: Arc::new(RunLog::default()),
        }
    }

    pub fn with_guard(mut self, guard: SqlGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<RunLog>) -> Self {
        self.run_log = run_log;
        self
    }

    /// Main entry point. Never returns an error: any stage failure becomes
    /// the outcome's error field.
    pub async fn process_question(&self, question: &str) -> PipelineOutcome {
        let started = Instant::now();
        info!("🚀 Processing question: {}", question);

        let outcome = match self.run_stages(question).await {
            Ok((sql, mut result, explanation)) => {
                result.truncate_to(MAX_RESULT_ROWS);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Pipeline completed in {} ms, returning {} rows",
                    elapsed_ms,
                    result.len()
                );
                PipelineOutcome::success(question.to_string(), sql, explanation, result, elapsed_ms)
            }
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!("Pipeline failed after {} ms: {}", elapsed_ms, e);
                PipelineOutcome::failure(question.to_string(), e.to_string(), elapsed_ms)
            }
        };

        self.record(&outcome);
        outcome
    }

    /// Strictly sequential stages; the first failure short-circuits the
    /// rest. The explanation sees the full row count, before truncation.
    async fn run_stages(&self, question: &str) -> Result<(String, QueryResult, String)> {
        let schema = self.schema.read_schema().await?;
        let relevance = self.relevance.filter(question, &schema).await?;
        let generated = self
            .generator
            .synthesize(question, &schema, Some(relevance.as_str()))
            .await?;
        let sql = self.guard.validate_and_clean(&generated.sql)?;
        let result = self.executor.execute(&sql).await?;
        let explanation = self.explainer.explain(question, &sql, result.len()).await?;
        Ok((sql, result, explanation))
    }

    /// Narrative schema description for the UI.
    pub async fn schema_summary(&self) -> Result<String> {
        let schema = self.schema.read_schema().await?;
        self.explainer.summarize_schema(&schema).await
    }

    /// Pass-through table listing for the UI.
    pub async fn list_tables(&self) -> Result<Vec<TableListing>> {
        let schema = self.schema.read_schema().await?;
        Ok(schema
            .tables
            .iter()
            .map(TableListing::from_descriptor)
            .collect())
    }

    fn record(&self, outcome: &PipelineOutcome) {
        if let Err(e) = self.run_log.record(RunLogEntry::from_outcome(outcome)) {
            warn!("Failed to record run log entry: {}", e);
        }
    }
}

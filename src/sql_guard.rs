//! Lexical safety gate for generated SQL.
//!
//! The gate is deliberately a substring check, not a parser: a denylisted
//! keyword anywhere in the text rejects the statement, even inside a string
//! literal. Over-rejection is the accepted cost of never letting a mutating
//! statement through. The optional strict mode adds an AST allow-list on
//! top; it can only reject more.

use crate::error::{NlqError, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

const DANGEROUS_KEYWORDS: [&str; 8] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "TRUNCATE", "CREATE", "ALTER", "EXEC",
];

#[derive(Debug, Clone, Default)]
pub struct SqlGuard {
    strict: bool,
}

impl SqlGuard {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Guard that additionally parses the statement and allow-lists only a
    /// single SELECT/WITH query node.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Gate the statement, then normalize it. Cleaning strips one trailing
    /// semicolon and bounds obviously unbounded shapes with `LIMIT 100`;
    /// applying it to an already-clean statement changes nothing.
    pub fn validate_and_clean(&self, sql: &str) -> Result<String> {
        if !is_safe_select(sql) {
            return Err(NlqError::UnsafeQuery(
                "Query not allowed: only SELECT queries are permitted".to_string(),
            ));
        }

        if self.strict {
            check_ast(sql)?;
        }

        let clean = clean_sql(sql);
        debug!("Validated SQL: {}", clean);
        Ok(clean)
    }
}

fn is_safe_select(query: &str) -> bool {
    let upper = query.trim().to_uppercase();

    let starts_allowed = upper.starts_with("SELECT") || upper.starts_with("WITH");
    if !starts_allowed {
        return false;
    }

    !DANGEROUS_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

fn check_ast(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| NlqError::UnsafeQuery(format!("Query failed to parse: {}", e)))?;

    if statements.len() != 1 {
        return Err(NlqError::UnsafeQuery(format!(
            "Expected exactly one statement, found {}",
            statements.len()
        )));
    }

    match &statements[0] {
        Statement::Query(_) => Ok(()),
        other => Err(NlqError::UnsafeQuery(format!(
            "Statement type not permitted: {}",
            other
        ))),
    }
}

fn clean_sql(sql: &str) -> String {
    let mut clean = sql.trim().to_string();

    if clean.ends_with(';') {
        clean.pop();
        let trimmed = clean.trim_end().len();
        clean.truncate(trimmed);
    }

    let upper = clean.to_uppercase();
    if !upper.contains("LIMIT") && (upper.contains("SELECT *") || upper.contains("SELECT COUNT")) {
        clean.push_str(" LIMIT 100");
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        let guard = SqlGuard::new();
        assert_eq!(guard.validate_and_clean("SELECT 1").unwrap(), "SELECT 1");
    }

    #[test]
    fn accepts_cte() {
        let guard = SqlGuard::new();
        assert!(guard
            .validate_and_clean("WITH t AS (SELECT 1) SELECT * FROM t")
            .is_ok());
    }

    #[test]
    fn rejects_non_select_prefix() {
        let guard = SqlGuard::new();
        for sql in [
            "DELETE FROM orders",
            "EXPLAIN SELECT 1",
            "insert into t values (1)",
            "",
        ] {
            assert!(
                matches!(guard.validate_and_clean(sql), Err(NlqError::UnsafeQuery(_))),
                "should reject {:?}",
                sql
            );
        }
    }

    #[test]
    fn rejects_dangerous_keyword_anywhere() {
        let guard = SqlGuard::new();
        for sql in [
            "SELECT 1; DROP TABLE x",
            "SELECT * FROM orders WHERE note = 'please update me'",
            "select 1 union select 2; truncate t",
        ] {
            assert!(
                matches!(guard.validate_and_clean(sql), Err(NlqError::UnsafeQuery(_))),
                "should reject {:?}",
                sql
            );
        }
    }

    #[test]
    fn injects_limit_on_select_star() {
        let guard = SqlGuard::new();
        assert_eq!(
            guard.validate_and_clean("SELECT * FROM orders").unwrap(),
            "SELECT * FROM orders LIMIT 100"
        );
    }

    #[test]
    fn injects_limit_on_select_count() {
        let guard = SqlGuard::new();
        assert_eq!(
            guard
                .validate_and_clean("SELECT COUNT(*) FROM facturas")
                .unwrap(),
            "SELECT COUNT(*) FROM facturas LIMIT 100"
        );
    }

    #[test]
    fn existing_limit_is_untouched() {
        let guard = SqlGuard::new();
        assert_eq!(
            guard
                .validate_and_clean("SELECT id FROM orders LIMIT 10")
                .unwrap(),
            "SELECT id FROM orders LIMIT 10"
        );
    }

    #[test]
    fn strips_single_trailing_semicolon() {
        let guard = SqlGuard::new();
        assert_eq!(
            guard.validate_and_clean("SELECT id FROM orders;").unwrap(),
            "SELECT id FROM orders"
        );
    }

    #[test]
    fn cleaning_is_idempotent() {
        let guard = SqlGuard::new();
        let once = guard.validate_and_clean("SELECT * FROM orders ;").unwrap();
        let twice = guard.validate_and_clean(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, "SELECT * FROM orders LIMIT 100");
    }

    #[test]
    fn strict_mode_accepts_single_query() {
        let guard = SqlGuard::strict();
        assert!(guard.validate_and_clean("SELECT id FROM orders").is_ok());
        assert!(guard
            .validate_and_clean("WITH t AS (SELECT 1) SELECT * FROM t")
            .is_ok());
    }

    #[test]
    fn strict_mode_rejects_multiple_statements() {
        let guard = SqlGuard::strict();
        let err = guard.validate_and_clean("SELECT 1; SELECT 2").unwrap_err();
        assert!(matches!(err, NlqError::UnsafeQuery(_)));

        // The default lexical gate lets the same text through.
        assert!(SqlGuard::new().validate_and_clean("SELECT 1; SELECT 2").is_ok());
    }

    #[test]
    fn strict_mode_rejects_unparsable_text() {
        let guard = SqlGuard::strict();
        let err = guard
            .validate_and_clean("SELECT FROM WHERE AND")
            .unwrap_err();
        assert!(matches!(err, NlqError::UnsafeQuery(_)));
    }
}

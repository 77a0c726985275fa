pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod explain;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod relevance;
pub mod sql_generator;
pub mod sql_guard;

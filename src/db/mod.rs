pub mod connection;
pub mod schema_repo;

// Database module for Clearscribe
// Provides SQLite persistence for jobs, word segments, and correction audit records

pub mod corrections_repo;
pub mod jobs_repo;
pub mod manager;
pub mod migrations;
pub mod models;
pub mod segments_repo;

pub use manager::DatabaseManager;
pub use models::*;

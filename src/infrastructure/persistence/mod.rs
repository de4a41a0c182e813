pub mod database;
pub mod query_service;
pub mod repositories;

pub mod achievements;
pub mod api;
pub mod config;
pub mod datekeys;
pub mod db;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod trigger;

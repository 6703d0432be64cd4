pub mod app;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod download;
pub mod enrich;
pub mod error;
pub mod metadata;
pub mod observations;
pub mod output;
pub mod query;
pub mod reshape;
pub mod store;
pub mod table;

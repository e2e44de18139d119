pub mod db;
pub mod kv;
pub mod local;
pub mod migration;
pub mod models;
pub mod service;
pub mod store;

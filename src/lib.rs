pub mod accounts;
pub mod applications;
pub mod auth;
pub mod browse;
pub mod catalog;
pub mod config;
pub mod contacts;
pub mod db;
pub mod error;
pub mod models;
pub mod notice;
pub mod resume;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod security;
pub mod tenant;

pub use app::{router, AppState, Backends};

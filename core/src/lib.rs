pub mod api;
pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod sink;
pub mod terminal;
pub mod text;

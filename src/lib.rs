pub mod analysis;
pub mod app;
pub mod cache;
pub mod config;
pub mod core;
pub mod crossfade;
pub mod decoder;
pub mod enrich;
pub mod error;
pub mod generation;
pub mod library;
pub mod model;
pub mod session;
pub mod ui;

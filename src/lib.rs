pub mod app;
pub mod cli;
pub mod config;
pub mod global;
pub mod llm;
pub mod meeting;
pub mod personas;
pub mod transcript;
pub mod ui;

pub mod analyzer;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logger;
pub mod matcher;
pub mod pipeline;
pub mod scanner;

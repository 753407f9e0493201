pub mod config;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod protocol;
pub mod types;

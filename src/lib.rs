pub mod cache;
pub mod config;
pub mod generate;
pub mod metrics;
pub mod rules;
pub mod server;

pub use config::Config;
pub use server::RedirectServer;

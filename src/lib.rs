pub mod config;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod request;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;

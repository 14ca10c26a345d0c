pub mod aggregate;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod invoker;
pub mod io;
pub mod ledger;
pub mod orchestrator;
pub mod paths;
pub mod script;
pub mod target;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{MigrateError, Result};

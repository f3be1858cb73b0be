//! Demo driver for the cart/stock consistency protocol.
//!
//! Seeds one product, buys it once without coordination and once inside a
//! transaction, and prints the committed state after each step.

pub mod config;
pub mod demo;
pub mod error;

pub use config::Config;
pub use demo::{DemoSummary, run_demo};
pub use error::{CliError, Result};

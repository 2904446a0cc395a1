pub mod cadence;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod io;
pub mod paths;
pub mod plan;
pub mod state;
pub mod store;

pub use error::{PostlineError, Result};

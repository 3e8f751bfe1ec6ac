#![doc = include_str!("../README.md")]

mod command;
mod config;
mod dispatcher;
mod error;
mod host;
mod pending;
mod pool;
mod status;
mod task;
#[cfg(test)]
mod testing;
mod worker;
mod workload;

pub use crate::config::*;
pub use crate::dispatcher::*;
pub use crate::error::*;
pub use crate::host::*;
pub use crate::pool::*;
pub use crate::status::*;
pub use crate::task::*;
pub use crate::worker::{WorkerEvent, WorkerHandle};
pub use crate::workload::*;

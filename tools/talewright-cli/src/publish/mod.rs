//! Publish command - package an export tree into per-target archives

mod command;
mod output;

pub use command::{execute, PublishArgs};

//! Lifecycle of the idlewatchd daemon
//!
//! The binary only parses arguments, sets up logging and signals, and hands
//! the loaded configuration to a [`Watcher`].

mod watcher;

pub use watcher::*;

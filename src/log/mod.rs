//! Chatlog loading and addressable message access.
//!
//! A chatlog is a JSON Lines file where each line is one message record.
//! [`MessageStore`] parses the whole file once into memory and provides
//! line-number addressing, context windows, sender lookup, and linear
//! keyword scans. Malformed lines are skipped and counted, never fatal.

pub mod message;
pub mod store;

pub use message::{Density, FactValue, LoadError, Message};
pub use store::{MessageStore, StoreStats, WindowEntry};

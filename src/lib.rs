//! File Transfer Server
//!
//! Moves files between an HTTP front end and an object store by publishing
//! them as fixed-size chunks on a message channel. A subscriber reassembles
//! the chunks per file name, in any arrival order, and persists each file
//! exactly once when its last chunk arrives.

pub mod channel;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod transfer;

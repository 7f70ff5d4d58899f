//! Chunked Transfer Module
//!
//! Moves files through the message channel in bounded-size chunks:
//! - Upload: split the buffer and publish every chunk concurrently
//! - Receive: collect chunks per file name in any order, persist on completion
//! - Download: resolve the stored object and its original extension
//!
//! Wire format on the upload topic (JSON):
//! `{ fileName, fileChunk: base64, chunkIndex, totalChunks, originalExtension }`

pub mod reassembly;
pub mod sender;
pub mod service;
pub mod types;
pub mod worker;

pub use reassembly::ReassemblyEngine;
pub use sender::{chunk_count, split_chunks, ChunkSender};
pub use service::{original_extension, Download, TransferService};
pub use types::*;
pub use worker::spawn_reassembly_worker;

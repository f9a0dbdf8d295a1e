//! Service layer
//!
//! Business logic of the relay: batching captured lines and shipping them
//! to the remote sink.

mod batch;
mod uploader;

pub use uploader::{BatchedUploader, StopReason, UploadReport, UploaderConfig};

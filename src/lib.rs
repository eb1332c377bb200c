//! # pixpost
//!
//! Folder-to-Pixelfed uploader. Watches a directory for new image files and
//! publishes each one to a Pixelfed instance (media upload, then status).
//!
//! The heart of the crate is [`queue::UploadQueue`]: a durable retry queue
//! persisted as a JSON document, with fixed-table backoff so transient
//! failures degrade gracefully instead of hammering the instance.

pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod runner;
pub mod watcher;

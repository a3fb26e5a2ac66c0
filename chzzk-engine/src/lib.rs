//! Chzzk live-detail client, HLS playlist parsing, and the live segment downloader.
//!
//! This crate is the core engine consumed by the `chzzk-recorder` binary: it knows
//! nothing about configuration files, process lifecycle, or scheduling policy beyond
//! what is needed to drive one channel's recording loop.

pub mod auth;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod filename;
pub mod http;
pub mod playlist;

pub use auth::{AuthHeaders, AuthStore};
pub use client::{ChzzkClient, LiveDetail, LiveDetailOutcome};
pub use config::{OnStartPrevious, Quality};
pub use downloader::{Downloader, DownloaderOptions, TerminalReason};
pub use error::{EngineError, Result};
pub use playlist::Variant;

//! Image relay pipeline
//!
//! Fetches remote images, optionally sends them through a remote compress and
//! resize service, falls back to the original asset when the remote side fails,
//! and keeps a persisted job ledger of progress and per-image failures that
//! supports retrying individual images.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

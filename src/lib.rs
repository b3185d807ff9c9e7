//! Stock and price monitoring for small web stores, with keyword-driven
//! product discovery.
//!
//! The pipeline: the [`scrape`] module turns product URLs into fused stock
//! evidence, [`scheduler`] runs due targets through it and raises events,
//! [`discovery`] searches stores for keyword matches, and [`probe`] asks
//! the storefront's cart how many units one order may carry.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod models;
pub mod net;
pub mod notify;
pub mod probe;
pub mod repository;
pub mod scheduler;
pub mod scrape;

//! costmesh - Cloud cost CLI backed by pluggable cost plugins
//!
//! This library provides the dispatch core: routing resources to cost
//! plugins, aggregating partial results, caching them on disk, evaluating
//! budgets and tracking recommendation dismissals.

mod atomic;

pub mod budget;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dismissal;
pub mod engine;
pub mod logging;
pub mod plugin;
pub mod routing;

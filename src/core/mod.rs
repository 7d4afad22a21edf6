//! Core application modules
//!
//! This module contains configuration, constants, logging, and the model
//! client with its providers.

pub mod client;
pub mod config;
pub mod constants;
pub mod logging;
pub mod provider;
pub mod providers;

#[cfg(test)]
pub mod testing;

//! HTTP chat surface

pub mod endpoints;

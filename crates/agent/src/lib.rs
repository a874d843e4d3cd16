//! Edge node monitoring agent
//!
//! Wires the resource monitor to host sample sources and serves its
//! snapshots, averages and instance lifecycle over HTTP.

pub mod api;
pub mod config;

//! Spectroscope - diagnose performance changes by comparing request-flow traces
//!
//! Two snapshots of request-flow graphs, one from a baseline period and one
//! from a problem period, are indexed into a trace store. Given a clustering
//! of the requests, each cluster is compared across the periods and
//! classified as a structural mutation, a response-time change, an
//! originating cluster, or not interesting. Ranked views then show the
//! representative request of each cluster with per-edge statistics overlaid.

pub mod accessor;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod decoder;
pub mod distance;
pub mod error;
pub mod graph;
pub mod hypothesis;
pub mod mutation;
pub mod pipeline;
pub mod store;

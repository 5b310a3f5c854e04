//! Gridmesh Fleet Backend Library
//!
//! This library provides the core functionality for the Gridmesh fleet dashboard,
//! including:
//! - Connectivity and staleness evaluation for remote energy controllers
//! - Configuration drift detection and template sync
//! - Diagnostic test suites run against sites and controllers
//! - Alarm severity aggregation and notification routing

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod schema;
pub mod services;

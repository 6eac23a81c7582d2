//! Add-on agent
//!
//! HTTP front end for the deployment engine, plus health and metrics
//! endpoints for Kubernetes probes and Prometheus.

pub mod api;
pub mod config;

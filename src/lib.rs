//! Floodgate - Per-Key Request Rate Limiting
//!
//! This crate implements an in-process rate limiter that governs incoming
//! requests per caller identity (or globally) using a fixed-window allowance.
//! It ships as a library with an axum middleware adapter, plus a small HTTP
//! service binary exposing a remote admission-check endpoint.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;

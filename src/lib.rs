//! marketplace-auth - Authentication and account-security core for the marketplace
//!
//! This crate provides credential hashing, single-use email tokens, account
//! lockout, rate limiting, session management, a security event log and a
//! periodic monitor that raises alerts over that log.

pub mod audit;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod otel;
pub mod server;

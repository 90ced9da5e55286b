//! Common utilities shared across the Fireface SDK crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for compact JWT utilities (structure, header, time claims)
pub mod jwt;

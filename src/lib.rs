//! Harcurl library crate.
//!
//! The stable, supported API surface is exposed via [`crate::api`] and
//! [`crate::prelude`]. These modules are intended for embedding the capture
//! pipeline in Rust applications and follow SemVer.
//!
//! Other modules are used by the CLI and the HTTP service and may change more
//! frequently.

pub mod api;
pub mod prelude;

pub mod analyze;
pub mod commands;
pub mod compact;
pub mod config;
pub mod curl;
pub mod error;
pub mod filter;
pub mod guard;
pub mod har;
pub mod matcher;
pub mod replay;
pub mod session;
pub mod size;
pub mod strip;
pub mod upload;

//! # Foreman Core
//!
//! Core types, traits, and error definitions for Foreman.
//! This crate provides the foundational abstractions shared by the cluster
//! core and any embedding application.

pub mod clock;
pub mod error;
pub mod id;
pub mod result;

pub use clock::*;
pub use error::*;
pub use id::*;
pub use result::*;

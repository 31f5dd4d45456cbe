//! Shared primitives used across modules.

pub mod bytes;

//! HTTP middleware.

pub mod signature;

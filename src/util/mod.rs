//! Utility helpers.

pub mod timeout;

//! Integration test crate for Framecast.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the framecast crates to verify they work together.

#[cfg(test)]
mod conversion;

#[cfg(test)]
mod gpu;

#[cfg(test)]
mod stream;

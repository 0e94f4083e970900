//! Cooperative cancellation of pipeline runs.
//!
//! A run checks its token before every stage; in-flight stage I/O is never
//! interrupted.

mod token;

pub use token::CancellationToken;

//! Cancellation support.
//!
//! Cancellation is cooperative: the runner consults the token before each
//! step, and a debug pause stops waiting as soon as the token flips.

mod token;

pub use token::CancellationToken;

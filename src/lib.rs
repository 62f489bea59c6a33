//! Tracks how long the user spends on each website and enforces focus sessions by redirecting
//! blocked domains. A daemon owns the tracking state, a browser bridge feeds it tab events over
//! a localhost message channel and picks up the redirect rules it writes.

pub mod browser_api;
pub mod cli;
pub mod daemon;
pub mod domain;
pub mod fs;
pub mod remote;
pub mod utils;

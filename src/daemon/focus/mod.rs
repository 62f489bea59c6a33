//! Focus sessions: which categories are blocked right now, and the redirect rules that enforce
//! it.

pub mod blocked;
pub mod categories;
pub mod rules;
pub mod session;

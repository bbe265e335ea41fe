//! Vote workflow: lookup, membership check, ledger mutation, promotion sweep.

pub mod error;
pub mod ledger;
pub mod lookup;
pub mod membership;
pub mod promotion;
pub mod session;

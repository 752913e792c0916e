//! repair-lab library crate
//!
//! Exposes the evaluation engine so external tooling can drive repairs and
//! re-validation without going through CLI startup.

pub mod apply;
pub mod baseline;
pub mod blocks;
pub mod catalogue;
pub mod categorize;
pub mod config;
pub mod driver;
pub mod extract;
pub mod history;
pub mod ledger;
pub mod matcher;
pub mod metrics;
pub mod passk;
pub mod signature;
pub mod util;
pub mod validate;

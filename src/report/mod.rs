//! Report cards and class ledgers built from the workspace records.

pub mod bundle;
pub mod compose;
pub mod data;
pub mod ledger;
pub mod model;

pub mod core;
pub mod reports;
pub mod sync;

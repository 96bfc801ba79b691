pub mod core;
pub mod focus;
pub mod grid;
pub mod lookup;
pub mod reports;
pub mod setup;
pub mod sheets;

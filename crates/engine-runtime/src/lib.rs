pub mod error;
pub mod runner;
pub mod store;

pub use runner::JobRunner;
pub use store::JobStore;

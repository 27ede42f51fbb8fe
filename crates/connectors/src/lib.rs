pub mod error;
pub mod memory;
pub mod salesforce;
pub mod source;
pub mod wire;

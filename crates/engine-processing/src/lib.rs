pub mod deploy;
pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod retrieval;
pub mod retry;
pub mod step;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_utils;

pub mod describe;
pub mod job;
pub mod log;
pub mod manifest;
pub mod records;
pub mod rules;

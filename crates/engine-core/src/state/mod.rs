//! Durable, debounced persistence of job progress and the detail log.

mod debounce;
pub mod detail_log;
pub mod job_state;

pub use detail_log::{DetailLogger, read_details};
pub use job_state::{JobStateLogger, write_atomic};

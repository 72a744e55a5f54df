pub mod serde_float;
pub mod timeout;

pub use timeout::{call_with_timeout, CallLimit, CallOutcome, CallPermit};

pub mod active_mask;
pub mod record;

pub use active_mask::{ActiveMask, ToBitString, MAX_THREADS};
pub use record::{LaneWrite, TraceRecord};

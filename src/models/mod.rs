pub mod bucket;
pub mod context;
pub mod segment;

pub use bucket::Bucket;
pub use context::{ContextKey, WindowContext};
pub use segment::{Segment, SegmentState};

pub mod batch;

pub use batch::{BatchOutcome, BatchPipeline};

pub mod engine;
pub mod error;
pub mod metrics;
pub mod ramp;
pub mod report;
pub mod sampler;
pub mod scenario;
pub mod thresholds;

pub use error::StampedeError;

pub mod error;
pub mod stats;

pub use error::{StatsError, StatsResult};

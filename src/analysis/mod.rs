//! Model training and evaluation over the final feature table.

pub mod metrics;
pub mod model;

pub use metrics::{Scores, mean_scores};
pub use model::{Dataset, FireModel};

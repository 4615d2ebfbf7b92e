//! Risk scoring and classification. The single home of the weights and thresholds.

mod engine;
mod score;

pub use engine::{classify, RiskAssessment, RiskEngine, RiskLevel};
pub use score::{contributions, score, score_vector, weight};

//! Agent evaluation: scored test suites, improved-config synthesis and the
//! recurring background cycle.

pub mod evaluator;
pub mod scheduler;
pub mod store;
pub mod test_cases;

pub use evaluator::{
    CaseDetail, DEFAULT_EVALUATOR_CALLER_ID, EvaluationResult, EvaluationTarget, Evaluator, faster_model,
    score_accuracy, score_cost, score_overall, score_speed,
};
pub use scheduler::{DEFAULT_EVALUATION_INTERVAL, EvaluationScheduler};
pub use store::{EvaluationStore, InMemoryEvaluationStore};
pub use test_cases::{TestCase, default_test_cases};

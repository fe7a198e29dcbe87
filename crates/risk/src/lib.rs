//! Risk Assessor: scores one automation's `DetectionOutput`
//! into a `RiskAssessment` via the four weighted component formulas and
//! appends the result to the automation's append-only risk-score history.

pub mod assessor;
pub mod formulas;

pub use assessor::RiskAssessor;

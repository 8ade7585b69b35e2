//! Confidence scoring and the risk/confidence decision authority (§4.3, §4.4).
//! Both are pure, deterministic, and make no network calls.

pub mod decision;
pub mod scorer;

pub use decision::{CandidateEvent, DecisionAuthority, RankResult, Risk, rank_candidates};
pub use scorer::{ConfidenceAssessment, ToolFamily, score_tool_call};

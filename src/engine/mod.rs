pub mod eligibility;
pub mod provision;
pub mod resolve;
pub mod vote;

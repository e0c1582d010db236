//! Tool approval: stored rules and the gate that resolves them

pub mod gate;
pub mod rules;

pub use gate::ApprovalGate;
pub use rules::{ApprovalDecision, ApprovalRule, ApprovalRuleStore, InMemoryApprovalRules};

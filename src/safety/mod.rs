//! Session safety limits and the governor that enforces them

pub mod governor;

pub use governor::{SafetyGovernor, SafetyLimits, Verdict, evaluate};

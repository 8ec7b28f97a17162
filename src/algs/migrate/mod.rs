//! Redistribution between two vector layouts: plan once, migrate often.

pub mod comm_plan;
pub mod engine;

pub use comm_plan::{CommPlan, PlanKind, Transfer};
pub use engine::migrate;

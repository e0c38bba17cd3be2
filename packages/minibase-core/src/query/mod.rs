//! Logical plans and their evaluation.

mod executor;
mod plan;

pub use executor::{QueryExecutor, ResultSet};
pub use plan::{Column, FieldRef, LogicalPlan, Operand, PlanBuilder, Predicate};

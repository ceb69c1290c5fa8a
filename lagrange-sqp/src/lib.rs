pub mod binary;
pub mod constraint;
pub mod graph;
pub mod hessian;
pub mod ternary;
pub mod unary;

pub use binary::{Binary, EqualityConstraint2};
pub use constraint::{EqualityConstraintBase, NonlinearEqualityConstraint};
pub use graph::ConstraintGraph;
pub use hessian::{BinaryHessians, HessianBlocks, TernaryHessians};
pub use ternary::{EqualityConstraint3, Ternary};
pub use unary::{EqualityConstraint1, Unary};

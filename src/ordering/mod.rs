//! Ordered parent → child memberships.
//!
//! Each relation keeps a dense, unique, 1-based `order_index` per parent. All
//! mutating operations run in a single transaction (a savepoint when the caller
//! already holds one) and rewrite indices through [`engine::reassign`], which
//! parks the affected rows below the parent's current range before placing them,
//! so `UNIQUE(parent_id, order_index)` is never violated mid-statement.

pub mod associations;
pub mod engine;
pub mod error;
pub mod relation;


pub use associations::copy_default_associations;
pub use engine::{
    InsertOptions, InsertOutcome, Membership, MembershipDetails, MoveOutcome, OrderingEngine,
    RemoveOutcome, ReorderAssignment, ORDER_BASE,
};
pub use error::{OrderingError, OrderingResult};
pub use relation::{AssociationKind, Relation};

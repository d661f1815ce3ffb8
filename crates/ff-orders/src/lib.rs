//! ff-orders
//!
//! The order lifecycle: status enum, the fixed adjacency table, transition
//! preconditions, and the append-only status-change audit row. This crate is
//! pure — persistence and the compare-and-swap write live behind the store
//! contract in `ff-pipeline`.

mod order;
mod state_machine;

pub use order::Order;
pub use state_machine::{
    allowed_next, check_transition, plan_transition, OrderStatus, StatusChange, TransitionContext,
    TransitionError, ALL_STATUSES,
};

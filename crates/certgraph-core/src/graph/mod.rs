//! In-memory concept graph
//!
//! [`GraphState`] holds concepts and relationships in index arenas and keeps
//! the prerequisite subgraph acyclic on every insert.

mod store;

pub use store::{
    ConceptNode, EdgeIdx, GraphState, NodeIdx, SubmitOutcome, TraversalDirection,
};

// Copyright 2025 Cowboy AI, LLC.

//! Store Effects: graph, vector, relational
//!
//! Each store is a trait plus a reference in-memory implementation
//! carrying the full contract semantics; wire bindings live behind
//! cargo features and translate the same contracts onto real servers.

pub mod graph;
pub mod relational;
pub mod vector;

#[cfg(feature = "neo4j")]
pub mod neo4j;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use graph::{GraphBatch, GraphMatch, GraphQuery, GraphStore, InMemoryGraphStore};
pub use relational::{InMemoryPatternStore, PatternStore};
pub use vector::{
    CollectionRouter, CollectionSpec, InMemoryVectorStore, VectorFilter, VectorHit, VectorPayload,
    VectorStore,
};

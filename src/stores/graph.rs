// Copyright 2025 Cowboy AI, LLC.

//! Graph store Effect
//!
//! Owns entities and relationships. Writes are idempotent merges; a
//! relationship is never visible unless both endpoints exist. Batches
//! are transactional: on failure nothing is visible. The graph may
//! contain cycles, so traversal always takes a caller-supplied depth
//! bound.

use crate::entity::{Entity, EntityKind};
use crate::errors::{NodeError, NodeResult};
use crate::identifiers::EntityKey;
use crate::relationship::{Relationship, RelationshipKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

/// A transactional batch of graph writes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphBatch {
    /// Entities to merge, applied before relationships
    pub entities: Vec<Entity>,
    /// Relationships to merge
    pub relationships: Vec<Relationship>,
}

/// Read-only graph query
///
/// The in-memory store evaluates this structure directly; wire bindings
/// translate it into a parameterized Cypher statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Restrict to entities of this kind
    pub kind: Option<EntityKind>,
    /// Restrict to entities under this source path prefix
    pub source_path_prefix: Option<String>,
    /// Restrict to entities whose name contains this fragment
    pub name_contains: Option<String>,
    /// Traverse outward from this entity instead of scanning
    pub start: Option<EntityKey>,
    /// Follow only these relationship kinds while traversing
    pub follow: Vec<RelationshipKind>,
    /// Traversal depth bound; mandatory when `start` is set
    pub max_depth: Option<usize>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

/// One query result with its traversal distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMatch {
    /// The matched entity
    pub entity: Entity,
    /// Hops from the traversal start; zero for scans
    pub depth: usize,
}

/// Graph store operations
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge an entity by `entity_id`
    async fn create_entity(&self, entity: Entity) -> NodeResult<()>;

    /// Merge a relationship by `(source, target, kind)`; fails with
    /// `PreconditionViolated` when an endpoint is missing
    async fn create_relationship(&self, relationship: Relationship) -> NodeResult<()>;

    /// Apply a batch in a single transaction, entities first
    async fn batch_upsert(&self, batch: GraphBatch) -> NodeResult<()>;

    /// Remove an entity and all incident relationships
    async fn delete_entity(&self, entity_id: &EntityKey) -> NodeResult<()>;

    /// Fetch one entity
    async fn get_entity(&self, entity_id: &EntityKey) -> NodeResult<Option<Entity>>;

    /// Relationships whose source is the given entity
    async fn outgoing(&self, entity_id: &EntityKey) -> NodeResult<Vec<Relationship>>;

    /// Evaluate a read-only query
    async fn query(&self, query: GraphQuery) -> NodeResult<Vec<GraphMatch>>;

    /// Number of entities currently visible
    async fn entity_count(&self) -> NodeResult<usize>;
}

#[derive(Default)]
struct GraphState {
    entities: HashMap<EntityKey, Entity>,
    relationships: HashMap<(EntityKey, EntityKey, RelationshipKind), Relationship>,
}

/// Reference in-memory graph store with full transactional semantics
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryGraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> NodeError {
        NodeError::Internal("graph store lock poisoned".into())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_entity(&self, entity: Entity) -> NodeResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        state.entities.insert(entity.entity_id.clone(), entity);
        Ok(())
    }

    async fn create_relationship(&self, relationship: Relationship) -> NodeResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        for endpoint in [&relationship.source_id, &relationship.target_id] {
            if !state.entities.contains_key(endpoint) {
                return Err(NodeError::PreconditionViolated(format!(
                    "relationship endpoint `{endpoint}` does not exist"
                )));
            }
        }
        state
            .relationships
            .insert(relationship.merge_key(), relationship);
        Ok(())
    }

    async fn batch_upsert(&self, batch: GraphBatch) -> NodeResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        // Validate the whole batch against current state plus the
        // batch's own entities before touching anything.
        let incoming: HashSet<&EntityKey> = batch.entities.iter().map(|e| &e.entity_id).collect();
        for relationship in &batch.relationships {
            for endpoint in [&relationship.source_id, &relationship.target_id] {
                if !state.entities.contains_key(endpoint) && !incoming.contains(endpoint) {
                    return Err(NodeError::PreconditionViolated(format!(
                        "relationship endpoint `{endpoint}` absent from batch and graph"
                    )));
                }
            }
        }

        for entity in batch.entities {
            state.entities.insert(entity.entity_id.clone(), entity);
        }
        for relationship in batch.relationships {
            state
                .relationships
                .insert(relationship.merge_key(), relationship);
        }
        Ok(())
    }

    async fn delete_entity(&self, entity_id: &EntityKey) -> NodeResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        state.entities.remove(entity_id);
        state
            .relationships
            .retain(|(source, target, _), _| source != entity_id && target != entity_id);
        Ok(())
    }

    async fn get_entity(&self, entity_id: &EntityKey) -> NodeResult<Option<Entity>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.entities.get(entity_id).cloned())
    }

    async fn outgoing(&self, entity_id: &EntityKey) -> NodeResult<Vec<Relationship>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        let mut edges: Vec<Relationship> = state
            .relationships
            .values()
            .filter(|r| &r.source_id == entity_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| {
            a.target_id
                .cmp(&b.target_id)
                .then_with(|| a.kind.as_tag().cmp(b.kind.as_tag()))
        });
        Ok(edges)
    }

    async fn query(&self, query: GraphQuery) -> NodeResult<Vec<GraphMatch>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;

        let mut matches = match &query.start {
            Some(start) => {
                let max_depth = query.max_depth.ok_or_else(|| {
                    NodeError::InvalidInput(
                        "traversal queries require an explicit depth bound".into(),
                    )
                })?;
                traverse(&state, start, &query.follow, max_depth)
            }
            None => state
                .entities
                .values()
                .map(|entity| GraphMatch {
                    entity: entity.clone(),
                    depth: 0,
                })
                .collect(),
        };

        matches.retain(|m| {
            query.kind.map_or(true, |k| m.entity.kind == k)
                && query
                    .source_path_prefix
                    .as_deref()
                    .map_or(true, |p| m.entity.source_path.starts_with(p))
                && query
                    .name_contains
                    .as_deref()
                    .map_or(true, |n| m.entity.name.contains(n))
        });
        matches.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
        });
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn entity_count(&self) -> NodeResult<usize> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.entities.len())
    }
}

/// Breadth-first traversal with a depth bound; cycles are tolerated by
/// tracking visited nodes
fn traverse(
    state: &GraphState,
    start: &EntityKey,
    follow: &[RelationshipKind],
    max_depth: usize,
) -> Vec<GraphMatch> {
    let mut visited: HashSet<EntityKey> = HashSet::new();
    let mut queue: VecDeque<(EntityKey, usize)> = VecDeque::new();
    let mut matches = Vec::new();

    visited.insert(start.clone());
    queue.push_back((start.clone(), 0));

    while let Some((key, depth)) = queue.pop_front() {
        if let Some(entity) = state.entities.get(&key) {
            matches.push(GraphMatch {
                entity: entity.clone(),
                depth,
            });
        }
        if depth >= max_depth {
            continue;
        }
        for ((source, target, kind), _) in state.relationships.iter() {
            if source == &key
                && (follow.is_empty() || follow.contains(kind))
                && visited.insert(target.clone())
            {
                queue.push_back((target.clone(), depth + 1));
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entity(path: &str, name: &str) -> Entity {
        Entity::new(EntityKind::Function, path, name, Utc::now())
    }

    fn module(path: &str, name: &str) -> Entity {
        Entity::new(EntityKind::Module, path, name, Utc::now())
    }

    #[tokio::test]
    async fn entity_merge_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let e = entity("src/a.py", "a.f");
        store.create_entity(e.clone()).await.unwrap();
        store.create_entity(e.clone()).await.unwrap();
        assert_eq!(store.entity_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn relationship_requires_endpoints() {
        let store = InMemoryGraphStore::new();
        let a = entity("src/a.py", "a.f");
        store.create_entity(a.clone()).await.unwrap();

        let missing = entity("src/b.py", "b.g");
        let rel = Relationship::new(
            a.entity_id.clone(),
            missing.entity_id.clone(),
            RelationshipKind::Calls,
        );
        let err = store.create_relationship(rel.clone()).await.unwrap_err();
        assert!(matches!(err, NodeError::PreconditionViolated(_)));

        store.create_entity(missing).await.unwrap();
        store.create_relationship(rel).await.unwrap();
    }

    #[tokio::test]
    async fn batch_upsert_is_all_or_nothing() {
        let store = InMemoryGraphStore::new();
        let a = module("src/a.py", "a");
        let b = entity("src/a.py", "a.f");
        let ghost = EntityKey::from_string("nowhere::function::ghost");

        let bad_batch = GraphBatch {
            entities: vec![a.clone(), b.clone()],
            relationships: vec![
                Relationship::new(
                    a.entity_id.clone(),
                    b.entity_id.clone(),
                    RelationshipKind::Defines,
                ),
                Relationship::new(a.entity_id.clone(), ghost, RelationshipKind::Contains),
            ],
        };
        let err = store.batch_upsert(bad_batch).await.unwrap_err();
        assert!(matches!(err, NodeError::PreconditionViolated(_)));
        // Nothing from the failed batch is visible.
        assert_eq!(store.entity_count().await.unwrap(), 0);

        let good_batch = GraphBatch {
            entities: vec![a.clone(), b.clone()],
            relationships: vec![Relationship::new(
                a.entity_id.clone(),
                b.entity_id.clone(),
                RelationshipKind::Defines,
            )],
        };
        store.batch_upsert(good_batch).await.unwrap();
        assert_eq!(store.entity_count().await.unwrap(), 2);
        assert_eq!(store.outgoing(&a.entity_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_allows_endpoints_within_the_batch() {
        let store = InMemoryGraphStore::new();
        let a = module("src/m.py", "m");
        let b = entity("src/m.py", "m.f");
        let batch = GraphBatch {
            entities: vec![a.clone(), b.clone()],
            relationships: vec![Relationship::new(
                a.entity_id.clone(),
                b.entity_id.clone(),
                RelationshipKind::Contains,
            )],
        };
        store.batch_upsert(batch).await.unwrap();
        assert!(store.get_entity(&b.entity_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_cascades_incident_relationships() {
        let store = InMemoryGraphStore::new();
        let a = module("src/m.py", "m");
        let b = entity("src/m.py", "m.f");
        store
            .batch_upsert(GraphBatch {
                entities: vec![a.clone(), b.clone()],
                relationships: vec![Relationship::new(
                    a.entity_id.clone(),
                    b.entity_id.clone(),
                    RelationshipKind::Contains,
                )],
            })
            .await
            .unwrap();

        store.delete_entity(&b.entity_id).await.unwrap();
        assert!(store.get_entity(&b.entity_id).await.unwrap().is_none());
        assert!(store.outgoing(&a.entity_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_is_depth_bounded_and_cycle_safe() {
        let store = InMemoryGraphStore::new();
        let a = module("src/a.py", "a");
        let b = module("src/b.py", "b");
        let c = module("src/c.py", "c");
        store
            .batch_upsert(GraphBatch {
                entities: vec![a.clone(), b.clone(), c.clone()],
                relationships: vec![
                    Relationship::new(
                        a.entity_id.clone(),
                        b.entity_id.clone(),
                        RelationshipKind::Imports,
                    ),
                    Relationship::new(
                        b.entity_id.clone(),
                        c.entity_id.clone(),
                        RelationshipKind::Imports,
                    ),
                    // Mutual import closes a cycle.
                    Relationship::new(
                        c.entity_id.clone(),
                        a.entity_id.clone(),
                        RelationshipKind::Imports,
                    ),
                ],
            })
            .await
            .unwrap();

        let shallow = store
            .query(GraphQuery {
                start: Some(a.entity_id.clone()),
                follow: vec![RelationshipKind::Imports],
                max_depth: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(shallow.len(), 2);

        let deep = store
            .query(GraphQuery {
                start: Some(a.entity_id.clone()),
                follow: vec![RelationshipKind::Imports],
                max_depth: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        // The cycle terminates; each node appears once.
        assert_eq!(deep.len(), 3);
    }

    #[tokio::test]
    async fn traversal_without_depth_bound_is_rejected() {
        let store = InMemoryGraphStore::new();
        let err = store
            .query(GraphQuery {
                start: Some(EntityKey::from_string("x")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn scan_filters_by_kind_and_path() {
        let store = InMemoryGraphStore::new();
        store.create_entity(module("src/a.py", "a")).await.unwrap();
        store
            .create_entity(entity("src/a.py", "a.f"))
            .await
            .unwrap();
        store
            .create_entity(entity("lib/b.py", "b.g"))
            .await
            .unwrap();

        let matches = store
            .query(GraphQuery {
                kind: Some(EntityKind::Function),
                source_path_prefix: Some("src/".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity.name, "f");
    }
}

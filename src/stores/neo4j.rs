// Copyright 2025 Cowboy AI, LLC.

//! Neo4j graph store binding
//!
//! Translates the graph contract onto parameterized Cypher. Nodes are
//! labeled by entity kind and carry `entity_id` as their unique
//! property; relationships are typed by kind and merged on the
//! `(source, target, kind)` triple.

use crate::entity::Entity;
use crate::errors::{NodeError, NodeResult};
use crate::identifiers::EntityKey;
use crate::relationship::Relationship;
use crate::stores::graph::{GraphBatch, GraphMatch, GraphQuery, GraphStore};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use serde::{Deserialize, Serialize};

/// Neo4j connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Bolt URI, e.g. `neo4j://localhost:7687`
    pub uri: String,
    /// Username
    pub user: String,
    /// Password
    pub password: String,
}

/// Graph store over a Neo4j server
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect to the server
    pub async fn connect(config: Neo4jConfig) -> NodeResult<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        Ok(Self { graph })
    }

    fn entity_merge(entity: &Entity) -> neo4rs::Query {
        // Labels cannot be parameterized; kind tags are a closed enum.
        let cypher = format!(
            "MERGE (e:{label} {{entity_id: $entity_id}}) \
             SET e.name = $name, e.source_path = $source_path, \
                 e.signature_hash = $signature_hash, e.confidence = $confidence, \
                 e.payload = $payload",
            label = entity.kind.as_tag()
        );
        query(&cypher)
            .param("entity_id", entity.entity_id.as_str())
            .param("name", entity.name.as_str())
            .param("source_path", entity.source_path.as_str())
            .param("signature_hash", entity.signature_hash.as_str())
            .param("confidence", entity.confidence as f64)
            .param(
                "payload",
                serde_json::to_string(entity).unwrap_or_default(),
            )
    }

    fn relationship_merge(relationship: &Relationship) -> neo4rs::Query {
        let cypher = format!(
            "MATCH (s {{entity_id: $source}}), (t {{entity_id: $target}}) \
             MERGE (s)-[r:{kind}]->(t) \
             SET r.weight = $weight, r.payload = $payload \
             RETURN count(r) AS merged",
            kind = relationship.kind.as_tag()
        );
        query(&cypher)
            .param("source", relationship.source_id.as_str())
            .param("target", relationship.target_id.as_str())
            .param("weight", relationship.weight as f64)
            .param(
                "payload",
                serde_json::to_string(relationship).unwrap_or_default(),
            )
    }

    async fn endpoints_exist(&self, relationship: &Relationship) -> NodeResult<bool> {
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (e) WHERE e.entity_id IN [$source, $target] \
                     RETURN count(e) AS present",
                )
                .param("source", relationship.source_id.as_str())
                .param("target", relationship.target_id.as_str()),
            )
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?
            .ok_or_else(|| NodeError::Internal("count query returned no row".into()))?;
        let present: i64 = row
            .get("present")
            .map_err(|e| NodeError::Internal(e.to_string()))?;
        Ok(present == 2)
    }

    fn entity_from_row(row: &neo4rs::Row) -> NodeResult<Entity> {
        let payload: String = row
            .get("payload")
            .map_err(|e| NodeError::Internal(e.to_string()))?;
        serde_json::from_str(&payload)
            .map_err(|e| NodeError::Internal(format!("stored entity is unreadable: {e}")))
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn create_entity(&self, entity: Entity) -> NodeResult<()> {
        self.graph
            .run(Self::entity_merge(&entity))
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))
    }

    async fn create_relationship(&self, relationship: Relationship) -> NodeResult<()> {
        if !self.endpoints_exist(&relationship).await? {
            return Err(NodeError::PreconditionViolated(format!(
                "endpoints of `{}` -> `{}` are not both present",
                relationship.source_id, relationship.target_id
            )));
        }
        self.graph
            .run(Self::relationship_merge(&relationship))
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))
    }

    async fn batch_upsert(&self, batch: GraphBatch) -> NodeResult<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;

        let mut queries: Vec<neo4rs::Query> = Vec::new();
        for entity in &batch.entities {
            queries.push(Self::entity_merge(entity));
        }
        for relationship in &batch.relationships {
            queries.push(Self::relationship_merge(relationship));
        }

        if let Err(e) = txn.run_queries(queries).await {
            let _ = txn.rollback().await;
            return Err(NodeError::transient("neo4j", e.to_string()));
        }
        txn.commit()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))
    }

    async fn delete_entity(&self, entity_id: &EntityKey) -> NodeResult<()> {
        self.graph
            .run(
                query("MATCH (e {entity_id: $entity_id}) DETACH DELETE e")
                    .param("entity_id", entity_id.as_str()),
            )
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))
    }

    async fn get_entity(&self, entity_id: &EntityKey) -> NodeResult<Option<Entity>> {
        let mut rows = self
            .graph
            .execute(
                query("MATCH (e {entity_id: $entity_id}) RETURN e.payload AS payload")
                    .param("entity_id", entity_id.as_str()),
            )
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?
        {
            Some(row) => Ok(Some(Self::entity_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn outgoing(&self, entity_id: &EntityKey) -> NodeResult<Vec<Relationship>> {
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (s {entity_id: $entity_id})-[r]->() \
                     RETURN r.payload AS payload ORDER BY r.payload",
                )
                .param("entity_id", entity_id.as_str()),
            )
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        let mut relationships = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?
        {
            let payload: String = row
                .get("payload")
                .map_err(|e| NodeError::Internal(e.to_string()))?;
            relationships.push(
                serde_json::from_str(&payload)
                    .map_err(|e| NodeError::Internal(e.to_string()))?,
            );
        }
        Ok(relationships)
    }

    async fn query(&self, graph_query: GraphQuery) -> NodeResult<Vec<GraphMatch>> {
        let cypher = match &graph_query.start {
            Some(_) => {
                let depth = graph_query.max_depth.ok_or_else(|| {
                    NodeError::InvalidInput(
                        "traversal queries require an explicit depth bound".into(),
                    )
                })?;
                format!(
                    "MATCH path = (s {{entity_id: $start}})-[*0..{depth}]->(e) \
                     RETURN DISTINCT e.payload AS payload, length(path) AS depth \
                     ORDER BY depth, e.entity_id"
                )
            }
            None => "MATCH (e) WHERE e.entity_id IS NOT NULL \
                     RETURN e.payload AS payload, 0 AS depth ORDER BY e.entity_id"
                .to_string(),
        };

        let mut q = query(&cypher);
        if let Some(start) = &graph_query.start {
            q = q.param("start", start.as_str());
        }

        let mut rows = self
            .graph
            .execute(q)
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        let mut matches = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?
        {
            let entity = Self::entity_from_row(&row)?;
            let depth: i64 = row.get("depth").unwrap_or(0);
            matches.push(GraphMatch {
                entity,
                depth: depth.max(0) as usize,
            });
        }

        matches.retain(|m| {
            graph_query.kind.map_or(true, |k| m.entity.kind == k)
                && graph_query
                    .source_path_prefix
                    .as_deref()
                    .map_or(true, |p| m.entity.source_path.starts_with(p))
                && graph_query
                    .name_contains
                    .as_deref()
                    .map_or(true, |n| m.entity.name.contains(n))
        });
        if let Some(limit) = graph_query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn entity_count(&self) -> NodeResult<usize> {
        let mut rows = self
            .graph
            .execute(query(
                "MATCH (e) WHERE e.entity_id IS NOT NULL RETURN count(e) AS total",
            ))
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| NodeError::transient("neo4j", e.to_string()))?
            .ok_or_else(|| NodeError::Internal("count query returned no row".into()))?;
        let total: i64 = row
            .get("total")
            .map_err(|e| NodeError::Internal(e.to_string()))?;
        Ok(total.max(0) as usize)
    }
}

//! The vector-index boundary: the index is treated as a similarity search
//! over schema metadata, abstracted behind a trait so call sites never
//! depend on the concrete HTTP client. [`SchemaIndex`] lets the builder be
//! exercised against a fake in tests without a live embeddings backend.

use std::collections::HashMap;

use async_trait::async_trait;

/// One object-name match from a semantic search over schema metadata.
#[derive(Debug, Clone)]
pub struct ObjectMatch {
    pub name: String,
    pub distance: f64,
}

/// One field match from a semantic search scoped to a single object.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub name: String,
    pub distance: f64,
    pub field_type: String,
    pub description: String,
}

/// A field flagged `needvalue=true` with its raw (unevaluated) default
/// expression, e.g. `"today"` or `"today + 7 days"`.
#[derive(Debug, Clone)]
pub struct FieldDefault {
    pub name: String,
    pub default_expr: String,
}

#[async_trait]
pub trait SchemaIndex: Send + Sync {
    /// Semantic search over object names, nearest-first.
    async fn search_objects(&self, query: &str, top_k: usize) -> Vec<ObjectMatch>;

    /// Semantic search over one object's fields, nearest-first.
    async fn search_fields(&self, object: &str, query: &str, top_k: usize) -> Vec<FieldMatch>;

    /// All `needvalue=true` fields for `object`, with their raw default
    /// expressions ( step 4).
    async fn field_defaults(&self, object: &str) -> Vec<FieldDefault>;

    /// Schema-metadata adjacency: entity name → names of entities it
    /// references via fields ending in `Id`. Built once at startup from
    /// schema metadata and treated as read-only after init.
    fn adjacency(&self) -> &HashMap<String, Vec<String>>;
}

//! Approximate nearest-neighbor vector search over memory embeddings.
//!
//! Backed by `usearch`'s HNSW index, cosine metric, operating directly on
//! memory ids (256-dim Matryoshka vectors). Memory ids are already unique
//! non-negative integers, so this index uses them as usearch keys directly
//! rather than maintaining a separate string-key table.

use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Matryoshka-truncated embedding width used throughout the engine.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// HNSW connectivity parameter (higher = better recall, more memory).
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building.
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower).
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Vector search error types.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    IndexCreation(String),
    IndexAdd(String),
    IndexSearch(String),
    IndexPersistence(String),
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::IndexCreation(e) => write!(f, "index creation failed: {e}"),
            VectorSearchError::IndexAdd(e) => write!(f, "failed to add vector: {e}"),
            VectorSearchError::IndexSearch(e) => write!(f, "search failed: {e}"),
            VectorSearchError::IndexPersistence(e) => write!(f, "persistence failed: {e}"),
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "invalid dimensions: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

/// Configuration for a [`VectorIndex`].
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    pub metric: MetricKind,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            metric: MetricKind::Cos,
        }
    }
}

/// Point-in-time statistics about a [`VectorIndex`].
#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    pub total_vectors: usize,
    pub dimensions: usize,
    pub connectivity: usize,
    pub memory_bytes: usize,
}

fn index_options(config: &VectorIndexConfig) -> IndexOptions {
    IndexOptions {
        dimensions: config.dimensions,
        metric: config.metric,
        quantization: ScalarKind::F32,
        connectivity: config.connectivity,
        expansion_add: config.expansion_add,
        expansion_search: config.expansion_search,
        multi: false,
    }
}

/// HNSW vector index over memory ids.
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    len: usize,
}

impl VectorIndex {
    /// Creates an index with [`VectorIndexConfig::default`].
    pub fn new() -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::default())
    }

    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let index = Index::new(&index_options(&config))
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        index
            .reserve(64)
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        Ok(Self {
            index,
            config,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn reserve_for_one_more(&self) -> Result<(), VectorSearchError> {
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 64);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        }
        Ok(())
    }

    /// Inserts or replaces the vector for `memory_id`.
    pub fn upsert(&mut self, memory_id: i64, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                vector.len(),
            ));
        }
        let key = memory_id as u64;
        let existed = self.index.contains(key);
        if existed {
            self.index
                .remove(key)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        }
        self.reserve_for_one_more()?;
        self.index
            .add(key, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        if !existed {
            self.len += 1;
        }
        Ok(())
    }

    /// Removes `memory_id` from the index. Returns `false` if absent.
    pub fn remove(&mut self, memory_id: i64) -> Result<bool, VectorSearchError> {
        let key = memory_id as u64;
        if !self.index.contains(key) {
            return Ok(false);
        }
        self.index
            .remove(key)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.len = self.len.saturating_sub(1);
        Ok(true)
    }

    pub fn contains(&self, memory_id: i64) -> bool {
        self.index.contains(memory_id as u64)
    }

    /// Returns up to `limit` nearest neighbors as `(memory_id, cosine_similarity)`.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(i64, f32)>, VectorSearchError> {
        if query.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                query.len(),
            ));
        }
        if self.is_empty() {
            return Ok(vec![]);
        }
        let results = self
            .index
            .search(query, limit)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        Ok(results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(key, distance)| (*key as i64, 1.0 - distance))
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<(), VectorSearchError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".into()))?;
        self.index
            .save(path_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))
    }

    pub fn load(path: &Path, config: VectorIndexConfig, len: usize) -> Result<Self, VectorSearchError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".into()))?;
        let index = Index::new(&index_options(&config))
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        index
            .load(path_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        Ok(Self { index, config, len })
    }

    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.config.dimensions,
            connectivity: self.config.connectivity,
            memory_bytes: self.index.serialized_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vector(seed: f32) -> Vec<f32> {
        (0..DEFAULT_DIMENSIONS)
            .map(|i| ((i as f32 + seed) / DEFAULT_DIMENSIONS as f32).sin())
            .collect()
    }

    #[test]
    fn new_index_is_empty() {
        let index = VectorIndex::new().unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn upsert_then_search_returns_self_first() {
        let mut index = VectorIndex::new().unwrap();
        let v1 = test_vector(1.0);
        let v2 = test_vector(2.0);
        let v3 = test_vector(100.0);

        index.upsert(1, &v1).unwrap();
        index.upsert(2, &v2).unwrap();
        index.upsert(3, &v3).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.contains(1));
        assert!(!index.contains(999));

        let results = index.search(&v1, 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn remove_evicts_key() {
        let mut index = VectorIndex::new().unwrap();
        index.upsert(1, &test_vector(1.0)).unwrap();
        assert!(index.contains(1));
        assert!(index.remove(1).unwrap());
        assert!(!index.contains(1));
        assert!(!index.remove(1).unwrap());
    }

    #[test]
    fn upsert_replaces_without_growing_len() {
        let mut index = VectorIndex::new().unwrap();
        index.upsert(1, &test_vector(1.0)).unwrap();
        assert_eq!(index.len(), 1);
        index.upsert(1, &test_vector(2.0)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = VectorIndex::new().unwrap();
        let wrong_size = vec![1.0_f32, 2.0, 3.0];
        assert!(index.upsert(1, &wrong_size).is_err());
    }
}

//! Semantic embeddings: local ONNX inference via `fastembed`, no external
//! API calls, asymmetric query/document encoding producing fixed-dimension
//! unit vectors.

mod local;

pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, Embedding,
    EmbeddingError, EmbeddingService, BATCH_SIZE, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};

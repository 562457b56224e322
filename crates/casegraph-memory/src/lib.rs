pub mod embeddings;
pub mod index;
pub mod retriever;

pub use embeddings::{cosine_similarity, EmbeddingProvider, HttpEmbeddingProvider};
pub use index::{IndexEntry, IndexStore, VectorIndex};
pub use retriever::EmbeddingRetriever;

//! Document indexing and retrieval core.
//!
//! Takes user documents through markup stripping, sentence-aware
//! chunking and embedding into a swappable vector store, then answers
//! questions over the indexed corpus with token-budgeted context
//! assembly and streamed generation. Processing runs through a
//! pipeline orchestrator with per-document confinement and
//! cancellation; a migration coordinator re-queues documents when the
//! embedding backend changes.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embedder;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod markup;
pub mod migration;
pub mod pipeline;
pub mod retrieval;
pub mod settings;
pub mod store;
pub mod tasks;

pub use cache::RenderCache;
pub use chunker::Chunker;
pub use config::{AppPaths, CacheConfig, ChunkerConfig, PipelineConfig, RetrievalConfig};
pub use document::{Chunk, Document, DocumentStore, ProcessingStatus};
pub use embedder::Embedder;
pub use errors::RagError;
pub use generation::GenerationService;
pub use migration::MigrationCoordinator;
pub use pipeline::PipelineOrchestrator;
pub use retrieval::{RagResponse, RetrievalEngine};
pub use store::{EmbeddingStore, InMemoryEmbeddingStore, SearchResult, SqliteEmbeddingStore};

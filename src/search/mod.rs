pub mod cache;
pub mod calorie_extraction;
pub mod data_loader;
pub mod embedding_engine;
pub mod index;
pub mod orchestrator;
pub mod query;
pub mod remote_index;
pub mod scorer;
pub mod vector_index;
pub mod vector_store;

pub use cache::{CacheStats, Clock, ManualClock, SearchCache, SystemClock};
pub use data_loader::load_recipe_corpus;
pub use embedding_engine::{Embedder, HashingEmbedder, StaticModelEmbedder, EMBEDDING_DIMENSION};
pub use index::{IndexFilters, IndexHit, RecipeIndex};
pub use orchestrator::{Alternatives, SearchBatch, SearchEntry, SearchOrchestrator};
pub use query::{CacheKey, SearchQuery};
pub use remote_index::HttpRecipeIndex;
pub use scorer::{RecipeScorer, ScoreBreakdown, ScoredCandidate, ScoringTarget};
pub use vector_index::VectorRecipeIndex;
pub use vector_store::VectorStore;

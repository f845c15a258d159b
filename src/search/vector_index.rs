use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::errors::PlanError;
use crate::recipe::RecipeDocument;
use crate::search::embedding_engine::Embedder;
use crate::search::index::{IndexFilters, IndexHit, RecipeIndex};
use crate::search::vector_store::VectorStore;

/// In-process index: embeds queries and answers cosine top-k over the store.
pub struct VectorRecipeIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
}

impl VectorRecipeIndex {
    /// Embeds every document and loads it into a fresh store.
    pub fn build(embedder: Arc<dyn Embedder>, documents: Vec<RecipeDocument>) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(RecipeDocument::embedding_text).collect();
        let embeddings = embedder
            .embed(&texts)
            .context("Failed to embed recipe corpus")?;
        if embeddings.len() != documents.len() {
            anyhow::bail!(
                "Embeddings and recipes count mismatch: {} vs {}",
                embeddings.len(),
                documents.len()
            );
        }

        let mut store = VectorStore::new(embedder.dimension());
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            let id = document.id.clone();
            store
                .upsert(document, &embedding)
                .with_context(|| format!("Failed to index recipe '{}'", id))?;
        }
        info!(recipes = store.len(), dimension = store.dimension(), "built vector recipe index");
        Ok(Self {
            embedder,
            store: Arc::new(store),
        })
    }

    pub fn from_snapshot(embedder: Arc<dyn Embedder>, path: &Path) -> Result<Self> {
        let store = VectorStore::load(path, embedder.dimension())?;
        info!(recipes = store.len(), path = %path.display(), "loaded vector recipe index snapshot");
        Ok(Self {
            embedder,
            store: Arc::new(store),
        })
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.store.save(path)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RecipeDocument>> {
        self.store.get(id)
    }
}

#[async_trait]
impl RecipeIndex for VectorRecipeIndex {
    async fn query(
        &self,
        text: &str,
        filters: &IndexFilters,
        k: usize,
    ) -> Result<Vec<IndexHit>, PlanError> {
        let embedder = Arc::clone(&self.embedder);
        let store = Arc::clone(&self.store);
        let text = text.to_owned();
        let filters = filters.clone();

        // CPU-bound: embedding plus the rayon scan run on the blocking pool.
        tokio::task::spawn_blocking(move || -> Result<Vec<IndexHit>, PlanError> {
            let vector = embedder
                .embed_one(&text)
                .map_err(|e| PlanError::IndexUnavailable(format!("embedding failed: {e}")))?;
            Ok(store
                .query(&vector, k, |document| filters.matches(document))
                .into_iter()
                .map(|(document, similarity)| IndexHit {
                    id: document.id.clone(),
                    similarity,
                    document,
                })
                .collect())
        })
        .await
        .map_err(|e| PlanError::IndexUnavailable(format!("vector search task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "vector recipe index"
    }
}

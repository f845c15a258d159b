//! Contiguous, normalized embedding matrix with recipe metadata and JSON snapshots.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::recipe::RecipeDocument;

type Float = f32;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    embedding_dim: usize,
    documents: Vec<RecipeDocument>,
    #[serde(with = "base64_matrix")]
    matrix: Vec<Float>,
}

mod base64_matrix {
    use super::*;
    use bytemuck::cast_slice;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(matrix: &[Float], serializer: S) -> Result<S::Ok, S::Error> {
        let bytes: &[u8] = cast_slice(matrix);
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Float>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(serde::de::Error::custom(format!(
                "matrix byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| Float::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Row index plus cosine score. Ordered so that a `BinaryHeap` pops the
/// weakest row first; ties prefer the earlier row.
#[derive(Debug, PartialEq)]
struct ScoredRow {
    score: Float,
    row: usize,
}

impl Eq for ScoredRow {}

impl PartialOrd for ScoredRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredRow {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or_else(|| {
                // NaN sorts as the weakest score.
                match (self.score.is_nan(), other.score.is_nan()) {
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => Ordering::Equal,
                }
            })
            .then_with(|| self.row.cmp(&other.row))
    }
}

#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    documents: Vec<Arc<RecipeDocument>>,
    positions: HashMap<String, usize>,
    matrix: Vec<Float>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: Vec::new(),
            positions: HashMap::new(),
            matrix: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Inserts or replaces a document and its vector. Returns `true` for a new id.
    pub fn upsert(&mut self, document: RecipeDocument, vector: &[Float]) -> Result<bool> {
        if vector.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch for recipe '{}': expected {}, got {}",
                document.id,
                self.dimension,
                vector.len()
            );
        }
        if vector.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("Embedding for recipe '{}' contains non-finite values", document.id);
        }

        let normalized = normalize(vector);
        match self.positions.get(&document.id) {
            Some(&row) => {
                let start = row * self.dimension;
                self.matrix[start..start + self.dimension].copy_from_slice(&normalized);
                self.documents[row] = Arc::new(document);
                Ok(false)
            }
            None => {
                self.positions.insert(document.id.clone(), self.documents.len());
                self.matrix.extend_from_slice(&normalized);
                self.documents.push(Arc::new(document));
                Ok(true)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RecipeDocument>> {
        self.positions.get(id).map(|&row| &self.documents[row])
    }

    /// Cosine top-k over rows accepted by `filter`, best first.
    pub fn query<F>(&self, query: &[Float], k: usize, filter: F) -> Vec<(Arc<RecipeDocument>, Float)>
    where
        F: Fn(&RecipeDocument) -> bool + Sync,
    {
        if k == 0 || self.is_empty() || query.len() != self.dimension {
            return Vec::new();
        }
        let query = normalize(query);
        let dimension = self.dimension;

        let scored: Vec<ScoredRow> = self
            .documents
            .par_iter()
            .enumerate()
            .filter(|(_, document)| filter(document))
            .map(|(row, _)| {
                let start = row * dimension;
                ScoredRow {
                    score: dot(&self.matrix[start..start + dimension], &query),
                    row,
                }
            })
            .collect();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for candidate in scored {
            heap.push(candidate);
            if heap.len() > k {
                heap.pop();
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|s| (Arc::clone(&self.documents[s.row]), s.score))
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            embedding_dim: self.dimension,
            documents: self.documents.iter().map(|d| d.as_ref().clone()).collect(),
            matrix: self.matrix.clone(),
        };
        let serialized = serde_json::to_string(&snapshot)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write vector snapshot to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path, dimension: usize) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector snapshot '{}'", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse vector snapshot '{}'", path.display()))?;

        if snapshot.embedding_dim != dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: snapshot has {}, expected {}",
                snapshot.embedding_dim,
                dimension
            );
        }
        let expected_len = snapshot.documents.len() * snapshot.embedding_dim;
        if snapshot.matrix.len() != expected_len {
            anyhow::bail!(
                "Matrix size mismatch: expected {}, got {}",
                expected_len,
                snapshot.matrix.len()
            );
        }

        let positions = snapshot
            .documents
            .iter()
            .enumerate()
            .map(|(row, d)| (d.id.clone(), row))
            .collect::<HashMap<_, _>>();
        if positions.len() != snapshot.documents.len() {
            anyhow::bail!("Vector snapshot '{}' contains duplicate recipe ids", path.display());
        }

        Ok(Self {
            dimension,
            documents: snapshot.documents.into_iter().map(Arc::new).collect(),
            positions,
            matrix: snapshot.matrix,
        })
    }
}

#[inline]
fn dot(a: &[Float], b: &[Float]) -> Float {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scales a vector to unit length. The zero vector is returned unchanged.
pub fn normalize(vector: &[Float]) -> Vec<Float> {
    let norm_sq: Float = vector.iter().map(|&x| x * x).sum();
    if norm_sq == 0.0 {
        return vec![0.0; vector.len()];
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vector.iter().map(|&x| x * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{EconomicTier, MealType};
    use rand::Rng;
    use tempfile::NamedTempFile;

    fn doc(id: &str, meal: MealType) -> RecipeDocument {
        RecipeDocument {
            id: id.into(),
            name: format!("Recipe {id}"),
            meal_types: vec![meal],
            category: String::new(),
            calorie_estimate: Some(400.0),
            ingredients: vec![],
            economic_tier: EconomicTier::Standard,
            raw_text: String::new(),
            macros: None,
        }
    }

    #[test]
    fn scored_row_heap_keeps_best_first() {
        let mut heap = BinaryHeap::new();
        for (row, score) in [0.8, 0.9, 0.7, 1.0].into_iter().enumerate() {
            heap.push(ScoredRow { score, row });
            if heap.len() > 2 {
                heap.pop();
            }
        }
        let top: Vec<Float> = heap.into_sorted_vec().iter().map(|s| s.score).collect();
        assert_eq!(top, vec![1.0, 0.9]);

        let nan = ScoredRow { score: Float::NAN, row: 0 };
        let real = ScoredRow { score: 0.5, row: 1 };
        assert_eq!(nan.cmp(&real), Ordering::Greater);
    }

    #[test]
    fn upsert_replaces_and_query_ranks() -> Result<()> {
        let mut store = VectorStore::new(3);
        assert!(store.upsert(doc("a", MealType::Lunch), &[1.0, 0.0, 0.0])?);
        assert!(store.upsert(doc("b", MealType::Lunch), &[0.0, 1.0, 0.0])?);
        assert!(store.upsert(doc("c", MealType::Dinner), &[0.9, 0.1, 0.0])?);
        assert!(!store.upsert(doc("b", MealType::Lunch), &[0.7, 0.7, 0.0])?);
        assert_eq!(store.len(), 3);

        let all = store.query(&[1.0, 0.0, 0.0], 3, |_| true);
        let ids: Vec<&str> = all.iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let lunch_only = store.query(&[1.0, 0.0, 0.0], 5, |d| d.serves(MealType::Lunch));
        assert_eq!(lunch_only.len(), 2);
        assert!(lunch_only.iter().all(|(d, _)| d.id != "c"));
        Ok(())
    }

    #[test]
    fn upsert_rejects_wrong_dimension() {
        let mut store = VectorStore::new(3);
        let err = store.upsert(doc("a", MealType::Lunch), &[1.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn snapshot_round_trip_preserves_ranking() -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut store = VectorStore::new(16);
        let mut vectors = Vec::new();
        for i in 0..20 {
            let v: Vec<Float> = (0..16).map(|_| rng.gen::<Float>() - 0.5).collect();
            store.upsert(doc(&i.to_string(), MealType::Lunch), &v)?;
            vectors.push(v);
        }
        let file = NamedTempFile::new()?;
        store.save(file.path())?;

        let loaded = VectorStore::load(file.path(), 16)?;
        assert_eq!(loaded.len(), 20);
        let hits = loaded.query(&vectors[7], 1, |_| true);
        assert_eq!(hits[0].0.id, "7");
        assert!(loaded.get("19").is_some());
        Ok(())
    }

    #[test]
    fn load_validates_dimension_and_matrix() -> Result<()> {
        let file = NamedTempFile::new()?;
        let corrupt = Snapshot {
            embedding_dim: 2,
            documents: vec![doc("x", MealType::Lunch)],
            matrix: vec![1.0],
        };
        fs::write(file.path(), serde_json::to_string(&corrupt)?)?;
        let err = VectorStore::load(file.path(), 2).unwrap_err().to_string();
        assert!(err.contains("Matrix size mismatch"), "{err}");

        let err = VectorStore::load(file.path(), 3).unwrap_err().to_string();
        assert!(err.contains("Embedding dimension mismatch"), "{err}");
        Ok(())
    }

    #[test]
    fn normalize_handles_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        let unit = normalize(&[3.0, 4.0]);
        assert!((unit[0] - 0.6).abs() < 1e-6);
        assert!((unit[1] - 0.8).abs() < 1e-6);
    }
}

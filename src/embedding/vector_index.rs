/// Exact cosine-similarity vector index with tag filtering
use crate::chunking::ChunkTag;
use crate::error::{DocentError, ProviderError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Search result with chunk index and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Ordinal of the chunk this vector belongs to
    pub index: usize,
    /// Cosine similarity (-1.0 to 1.0, higher is more similar)
    pub score: f32,
}

/// Flat inner-product index over L2-normalized rows
///
/// Built wholesale from one document's vectors and read-only afterwards.
/// Row `i` belongs to chunk `i`. Search is exhaustive, so results are exact
/// and deterministic.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// Normalized vectors, one row per chunk
    vectors: Array2<f32>,
    /// Tag of each row
    tags: Vec<ChunkTag>,
}

impl VectorIndex {
    /// Create an empty (unbuilt) index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(vector, tag)` entries
    ///
    /// All vectors must share one dimension. A mismatch is a
    /// [`DocentError::DimensionMismatch`].
    pub fn build(entries: Vec<(Vec<f32>, ChunkTag)>) -> Result<Self> {
        let Some(dimension) = entries.first().map(|(v, _)| v.len()) else {
            return Ok(Self::new());
        };

        if dimension == 0 {
            return Err(DocentError::Embedding(ProviderError::Response {
                provider: "index".to_string(),
                message: "Embedding vectors are empty".to_string(),
            }));
        }

        let mut flat = Vec::with_capacity(entries.len() * dimension);
        let mut tags = Vec::with_capacity(entries.len());

        for (i, (vector, tag)) in entries.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(DocentError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(DocentError::Embedding(ProviderError::Response {
                    provider: "index".to_string(),
                    message: format!("Embedding {} contains non-finite values", i),
                }));
            }

            flat.extend(normalize(&vector));
            tags.push(tag);
        }

        let vectors = Array2::from_shape_vec((tags.len(), dimension), flat)
            .map_err(|e| DocentError::Other(anyhow::anyhow!("Failed to shape index: {}", e)))?;

        tracing::debug!("Built vector index: {} x {}", tags.len(), dimension);

        Ok(Self { vectors, tags })
    }

    /// Find the `top_k` most similar entries, optionally restricted to one tag
    ///
    /// Only tag-matching entries are ranked. `top_k` is clamped to the number
    /// of eligible entries; ties are broken by ascending chunk index. An empty
    /// index yields an empty result.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<ChunkTag>,
    ) -> Result<Vec<SearchHit>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension() {
            return Err(DocentError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = Array1::from(normalize(query));

        let mut hits: Vec<SearchHit> = self
            .vectors
            .axis_iter(Axis(0))
            .zip(self.tags.iter())
            .enumerate()
            .filter(|(_, (_, tag))| filter.map_or(true, |f| **tag == f))
            .map(|(index, (row, _))| SearchHit {
                index,
                score: similarity(row, &query),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.index.cmp(&b.index))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Vector dimension (0 when unbuilt)
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Number of entries carrying `tag`
    pub fn count_tag(&self, tag: ChunkTag) -> usize {
        self.tags.iter().filter(|t| **t == tag).count()
    }
}

fn similarity(row: ArrayView1<'_, f32>, query: &Array1<f32>) -> f32 {
    let score = row.dot(query);
    // -0.0 and NaN would order inconsistently under total_cmp
    if score.is_nan() || score == 0.0 {
        return 0.0;
    }
    score.clamp(-1.0, 1.0)
}

/// L2-normalize; zero vectors stay zero
fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|x| x / norm).collect()
}

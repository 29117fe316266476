//! Similarity Recommendation Module
//!
//! Resolves a query (a song name or a raw feature mapping) into the trained
//! feature space, asks the [`SimilarityIndex`] for neighbors and turns them
//! into ranked [`SongItem`]s.

use crate::artifact::ModelArtifact;
use crate::error::{ModelError, RecommendError};
use crate::feature_space::NormalizationTransform;
use crate::index::SimilarityIndex;
use crate::song::{SongItem, SongRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result count used when the caller does not give one.
pub const DEFAULT_COUNT: usize = 10;

/// Extra neighbors fetched for name queries, so that excluding the input
/// song (and its duplicates) still leaves enough results.
const OVERFETCH: usize = 10;

/// Reported similarities floor at zero, so ranking caps distances here and
/// everything past orthogonal ties, ordered by row.
const DISTANCE_CAP: f64 = 1.0;

/// Output of [`Recommender::recommend_by_name`].
#[derive(Debug, Clone, Serialize)]
pub struct NameRecommendation {
    /// The catalog song the name resolved to, with similarity 1.0.
    pub input_song: SongItem,
    pub results: Vec<SongItem>,
}

/// Read-only recommendation engine over one trained model.
#[derive(Debug)]
pub struct Recommender {
    feature_names: Vec<String>,
    feature_positions: HashMap<String, usize>,
    transform: NormalizationTransform,
    catalog: Vec<SongRecord>,
    lowercase_names: Vec<String>,
    index: SimilarityIndex,
}

impl Recommender {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        artifact.validate()?;
        let ModelArtifact {
            feature_names,
            transform,
            catalog,
        } = artifact;

        let vectors: Vec<&[f64]> = catalog
            .iter()
            .map(|s| s.feature_vector.as_slice())
            .collect();
        let index = SimilarityIndex::build(&vectors)?;

        let feature_positions = feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let lowercase_names = catalog
            .iter()
            .map(|s| s.track_name.to_lowercase())
            .collect();

        Ok(Self {
            feature_names,
            feature_positions,
            transform,
            catalog,
            lowercase_names,
            index,
        })
    }

    /// Load and index the artifact at `path`.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let recommender = Self::from_artifact(ModelArtifact::load(path)?)?;
        info!(
            "Loaded model from {:?}: {} songs, {} features",
            path,
            recommender.len(),
            recommender.feature_names.len()
        );
        Ok(recommender)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Trained dimension names, in vector order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Read a feature mapping from a JSON object. Only trained dimensions
    /// are looked at; each must be present and numeric.
    pub fn parse_features(
        &self,
        value: &Value,
    ) -> Result<HashMap<String, f64>, RecommendError> {
        let Some(object) = value.as_object() else {
            return Err(RecommendError::InvalidFeatures {
                missing: self.feature_names.clone(),
                non_numeric: Vec::new(),
            });
        };

        let mut features = HashMap::with_capacity(self.feature_names.len());
        let mut missing = Vec::new();
        let mut non_numeric = Vec::new();
        for name in &self.feature_names {
            match object.get(name) {
                Some(v) => match v.as_f64() {
                    Some(x) => {
                        features.insert(name.clone(), x);
                    }
                    None => non_numeric.push(name.clone()),
                },
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() && non_numeric.is_empty() {
            Ok(features)
        } else {
            Err(RecommendError::InvalidFeatures {
                missing,
                non_numeric,
            })
        }
    }

    /// Recommend songs similar to the most popular catalog song whose name
    /// contains `name` (case-insensitive).
    pub fn recommend_by_name(
        &self,
        name: &str,
        n: usize,
    ) -> Result<NameRecommendation, RecommendError> {
        check_count(n)?;
        let row = self.resolve_name(name)?;
        let song = &self.catalog[row];
        debug!(
            "Resolved {:?} to row {} ({} - {})",
            name, row, song.track_name, song.track_artist
        );

        Ok(NameRecommendation {
            input_song: SongItem::from_record(song, 1.0),
            results: self.recommend_by_row(row, n),
        })
    }

    /// Recommend songs closest to a raw (unnormalized) feature mapping.
    /// Keys outside the trained feature set are ignored.
    pub fn recommend_by_features(
        &self,
        features: &HashMap<String, f64>,
        n: usize,
    ) -> Result<Vec<SongItem>, RecommendError> {
        check_count(n)?;
        let raw = self.order_features(features)?;
        let query = self.transform.transform(&raw);

        Ok(self
            .index
            .query_capped(&query, n, DISTANCE_CAP)
            .into_iter()
            .map(|nb| {
                SongItem::from_record(&self.catalog[nb.row], clamp_similarity(nb.similarity()))
            })
            .collect())
    }

    /// Highest popularity wins; ties go to the earliest row.
    fn resolve_name(&self, name: &str) -> Result<usize, RecommendError> {
        if name.trim().is_empty() {
            return Err(RecommendError::EmptyQuery);
        }
        let needle = name.to_lowercase();

        let mut best: Option<usize> = None;
        for (row, candidate) in self.lowercase_names.iter().enumerate() {
            if !candidate.contains(&needle) {
                continue;
            }
            let better = match best {
                Some(b) => self.catalog[row].track_popularity > self.catalog[b].track_popularity,
                None => true,
            };
            if better {
                best = Some(row);
            }
        }
        best.ok_or_else(|| RecommendError::NotFound(name.to_string()))
    }

    /// Neighbors of catalog row `row`, skipping every row with the same name
    /// and artist (the song itself and its duplicate entries).
    fn recommend_by_row(&self, row: usize, n: usize) -> Vec<SongItem> {
        let song = &self.catalog[row];
        let mut results = Vec::with_capacity(n.min(self.len()));
        let k = n.saturating_add(OVERFETCH);
        for nb in self
            .index
            .query_capped(&song.feature_vector, k, DISTANCE_CAP)
        {
            let candidate = &self.catalog[nb.row];
            if candidate.same_song(song) {
                continue;
            }
            results.push(SongItem::from_record(
                candidate,
                clamp_similarity(nb.similarity()),
            ));
            if results.len() >= n {
                break;
            }
        }
        results
    }

    /// Arrange `features` in trained dimension order.
    fn order_features(
        &self,
        features: &HashMap<String, f64>,
    ) -> Result<Vec<f64>, RecommendError> {
        let mut raw = vec![0.0; self.feature_names.len()];
        let mut missing = Vec::new();
        let mut non_numeric = Vec::new();
        for (name, &i) in &self.feature_positions {
            match features.get(name) {
                Some(v) if v.is_finite() => raw[i] = *v,
                Some(_) => non_numeric.push(name.clone()),
                None => missing.push(name.clone()),
            }
        }

        if missing.is_empty() && non_numeric.is_empty() {
            return Ok(raw);
        }
        missing.sort();
        non_numeric.sort();
        warn!(
            "Rejected feature query: {} missing, {} non-numeric",
            missing.len(),
            non_numeric.len()
        );
        Err(RecommendError::InvalidFeatures {
            missing,
            non_numeric,
        })
    }
}

fn check_count(n: usize) -> Result<(), RecommendError> {
    if n == 0 {
        return Err(RecommendError::InvalidCount(n));
    }
    Ok(())
}

/// Similarities are reported in `[0, 1]`.
fn clamp_similarity(similarity: f64) -> f64 {
    similarity.clamp(0.0, 1.0)
}

/// A model that may have failed to load. Serving keeps running either way;
/// queries against an unavailable model fail with
/// [`RecommendError::ModelUnavailable`].
#[derive(Debug)]
pub enum ModelState {
    Ready(Recommender),
    Unavailable(String),
}

impl ModelState {
    pub fn load(path: &Path) -> Self {
        match Recommender::load(path) {
            Ok(recommender) => Self::Ready(recommender),
            Err(e) => {
                warn!("Model at {:?} is unavailable: {}", path, e);
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn recommender(&self) -> Result<&Recommender, RecommendError> {
        match self {
            Self::Ready(recommender) => Ok(recommender),
            Self::Unavailable(reason) => Err(RecommendError::ModelUnavailable(reason.clone())),
        }
    }
}

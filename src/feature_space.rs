//! Feature space layout and normalization.
//!
//! A trained feature space is the 12 audio attributes followed by one-hot
//! indicator columns for playlist genre and subgenre. As with
//! `pandas.get_dummies(drop_first=True)`, the lexicographically first
//! category of each column gets no indicator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const AUDIO_FEATURES: [&str; 12] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "duration_ms",
];

pub const GENRE_PREFIX: &str = "playlist_genre_";
pub const SUBGENRE_PREFIX: &str = "playlist_subgenre_";

/// Ordered dimension names for the given category sets.
pub fn feature_names(genres: &BTreeSet<String>, subgenres: &BTreeSet<String>) -> Vec<String> {
    let mut names: Vec<String> = AUDIO_FEATURES.iter().map(|s| s.to_string()).collect();
    names.extend(genres.iter().skip(1).map(|g| format!("{GENRE_PREFIX}{g}")));
    names.extend(
        subgenres
            .iter()
            .skip(1)
            .map(|g| format!("{SUBGENRE_PREFIX}{g}")),
    );
    names
}

/// Raw (unnormalized) vector for one song in the layout `names`.
/// A category without an indicator column encodes as all zeros.
pub fn encode_raw(
    names: &[String],
    audio: &[f64; AUDIO_FEATURES.len()],
    genre: &str,
    subgenre: &str,
) -> Vec<f64> {
    let mut raw = vec![0.0; names.len()];
    raw[..audio.len()].copy_from_slice(audio);

    let genre_col = format!("{GENRE_PREFIX}{genre}");
    let subgenre_col = format!("{SUBGENRE_PREFIX}{subgenre}");
    for (slot, name) in raw.iter_mut().zip(names).skip(audio.len()) {
        if *name == genre_col || *name == subgenre_col {
            *slot = 1.0;
        }
    }
    raw
}

/// Per-dimension standard scaling, fitted once over the whole catalog.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NormalizationTransform {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl NormalizationTransform {
    /// Fit means and population standard deviations over `rows`.
    /// Constant dimensions get a scale of 1.
    pub fn fit<V: AsRef<[f64]>>(rows: &[V], dim: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; dim];
        for row in rows {
            for (m, x) in means.iter_mut().zip(row.as_ref()) {
                *m += x;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut vars = vec![0.0; dim];
        for row in rows {
            for ((v, m), x) in vars.iter_mut().zip(&means).zip(row.as_ref()) {
                *v += (x - m).powi(2);
            }
        }
        let scales = vars
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > 10.0 * f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_feature_names_drop_first_category() {
        let names = feature_names(&set(&["rock", "edm", "pop"]), &set(&["indie"]));
        assert_eq!(names.len(), 14);
        assert_eq!(names[0], "danceability");
        assert_eq!(names[11], "duration_ms");
        assert_eq!(names[12], "playlist_genre_pop");
        assert_eq!(names[13], "playlist_genre_rock");
    }

    #[test]
    fn test_encode_raw_sets_indicators() {
        let names = feature_names(&set(&["edm", "pop"]), &set(&["dance pop", "electro"]));
        let audio = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];

        let raw = encode_raw(&names, &audio, "pop", "electro");
        assert_eq!(&raw[..12], &audio);
        assert_eq!(&raw[12..], &[1.0, 1.0]);

        // Dropped categories encode as zeros.
        let raw = encode_raw(&names, &audio, "edm", "dance pop");
        assert_eq!(&raw[12..], &[0.0, 0.0]);
    }

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let t = NormalizationTransform::fit(&rows, 2);
        assert_eq!(t.means, vec![2.0, 5.0]);
        assert_eq!(t.scales, vec![1.0, 1.0]);
        assert_eq!(t.transform(&[3.0, 5.0]), vec![1.0, 0.0]);

        let rows = vec![vec![0.0], vec![4.0]];
        let t = NormalizationTransform::fit(&rows, 1);
        assert_eq!(t.scales, vec![2.0]);
        assert_eq!(t.transform(&[6.0]), vec![2.0]);
    }
}

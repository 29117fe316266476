use serde::{Deserialize, Serialize};

/// Genre reported when a song has none.
pub const UNKNOWN_GENRE: &str = "Unknown";

/// One catalog row. Immutable once the catalog is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub track_id: String,
    pub track_name: String,
    pub track_artist: String,
    pub track_popularity: i64,
    #[serde(default)]
    pub genre: Option<String>,
    /// Normalized vector in the trained feature space.
    pub feature_vector: Vec<f64>,
}

impl SongRecord {
    pub fn genre_or_unknown(&self) -> &str {
        self.genre.as_deref().unwrap_or(UNKNOWN_GENRE)
    }

    /// Identity used to keep a song out of its own recommendations.
    pub fn same_song(&self, other: &SongRecord) -> bool {
        self.track_name == other.track_name && self.track_artist == other.track_artist
    }
}

/// A song as returned to callers, with its similarity to the query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SongItem {
    pub track_name: String,
    pub track_artist: String,
    pub genre: String,
    /// `1 - cosine distance`, floored at 0.
    pub similarity: f64,
    pub track_popularity: u32,
    pub track_id: String,
}

impl SongItem {
    pub fn from_record(record: &SongRecord, similarity: f64) -> Self {
        Self {
            track_name: record.track_name.clone(),
            track_artist: record.track_artist.clone(),
            genre: record.genre_or_unknown().to_string(),
            similarity,
            // Popularity is a 0..=100 score; anything below zero is bad data.
            track_popularity: record.track_popularity.clamp(0, u32::MAX as i64) as u32,
            track_id: record.track_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, artist: &str, genre: Option<&str>) -> SongRecord {
        SongRecord {
            track_id: "id".into(),
            track_name: name.into(),
            track_artist: artist.into(),
            track_popularity: -3,
            genre: genre.map(str::to_string),
            feature_vector: vec![0.0],
        }
    }

    #[test]
    fn test_missing_genre_is_unknown() {
        let item = SongItem::from_record(&record("A", "B", None), 0.5);
        assert_eq!(item.genre, "Unknown");
        assert_eq!(item.track_popularity, 0);
    }

    #[test]
    fn test_same_song_compares_name_and_artist() {
        let a = record("Yesterday", "The Beatles", Some("rock"));
        let mut b = record("Yesterday", "The Beatles", None);
        b.track_id = "other".into();
        assert!(a.same_song(&b));
        assert!(!a.same_song(&record("Yesterday", "Boyz II Men", None)));
    }
}

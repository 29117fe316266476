//! Offline model build: songs CSV in, [`ModelArtifact`] out.

use crate::artifact::ModelArtifact;
use crate::error::TrainError;
use crate::feature_space::{self, NormalizationTransform, AUDIO_FEATURES};
use crate::song::SongRecord;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// One CSV row as read. Every column used by the model is optional here so
/// that incomplete rows can be counted and dropped instead of failing the
/// whole read.
#[derive(Debug, Deserialize)]
struct RawSong {
    #[serde(default)]
    track_id: Option<String>,
    #[serde(default)]
    track_name: Option<String>,
    #[serde(default)]
    track_artist: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    track_popularity: Option<f64>,
    #[serde(default)]
    playlist_genre: Option<String>,
    #[serde(default)]
    playlist_subgenre: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    danceability: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    energy: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    key: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    loudness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    mode: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    speechiness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    acousticness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    instrumentalness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    liveness: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    valence: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    tempo: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    duration_ms: Option<f64>,
}

/// A row with every required field present.
#[derive(Debug)]
struct ParsedSong {
    track_id: String,
    track_name: String,
    track_artist: String,
    track_popularity: i64,
    genre: String,
    subgenre: String,
    audio: [f64; AUDIO_FEATURES.len()],
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl RawSong {
    fn parse(self) -> Option<ParsedSong> {
        let audio = [
            self.danceability?,
            self.energy?,
            self.key?,
            self.loudness?,
            self.mode?,
            self.speechiness?,
            self.acousticness?,
            self.instrumentalness?,
            self.liveness?,
            self.valence?,
            self.tempo?,
            self.duration_ms?,
        ];
        if audio.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let popularity = self.track_popularity.filter(|p| p.is_finite())?;

        Some(ParsedSong {
            track_id: non_empty(self.track_id)?,
            track_name: non_empty(self.track_name)?,
            track_artist: non_empty(self.track_artist)?,
            track_popularity: popularity.round() as i64,
            genre: non_empty(self.playlist_genre)?,
            subgenre: non_empty(self.playlist_subgenre)?,
            audio,
        })
    }
}

/// Build a model from the songs CSV at `path`.
pub fn train_from_path(path: &Path) -> Result<ModelArtifact, TrainError> {
    info!("Reading songs from {:?}...", path);
    let file = std::fs::File::open(path)?;
    train_from_reader(file, &path.display().to_string())
}

/// Build a model from CSV data. `source` names the input in errors and logs.
pub fn train_from_reader<R: Read>(reader: R, source: &str) -> Result<ModelArtifact, TrainError> {
    // 1. Read Phase (Serial)
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut raw_rows = Vec::new();
    for record in reader.deserialize::<RawSong>() {
        raw_rows.push(record?);
    }
    let total = raw_rows.len();

    // 2. Validate Phase (Parallel)
    let songs: Vec<ParsedSong> = raw_rows
        .into_par_iter()
        .filter_map(RawSong::parse)
        .collect();
    let dropped = total - songs.len();
    if dropped > 0 {
        warn!(
            "Dropped {} of {} rows with missing or invalid fields",
            dropped, total
        );
    }
    if songs.is_empty() {
        return Err(TrainError::NoUsableRows(source.to_string()));
    }

    // 3. Encode Phase
    let genres: BTreeSet<String> = songs.iter().map(|s| s.genre.clone()).collect();
    let subgenres: BTreeSet<String> = songs.iter().map(|s| s.subgenre.clone()).collect();
    let feature_names = feature_space::feature_names(&genres, &subgenres);
    info!(
        "Feature space: {} dimensions ({} genres, {} subgenres)",
        feature_names.len(),
        genres.len(),
        subgenres.len()
    );

    let raw_matrix: Vec<Vec<f64>> = songs
        .par_iter()
        .map(|s| {
            feature_space::encode_raw(&feature_names, &s.audio, &s.genre, &s.subgenre)
        })
        .collect();
    let transform = NormalizationTransform::fit(&raw_matrix, feature_names.len());

    // 4. Merge Phase
    let catalog: Vec<SongRecord> = songs
        .into_par_iter()
        .zip(raw_matrix.par_iter())
        .map(|(s, raw)| SongRecord {
            track_id: s.track_id,
            track_name: s.track_name,
            track_artist: s.track_artist,
            track_popularity: s.track_popularity,
            genre: Some(s.genre),
            feature_vector: transform.transform(raw),
        })
        .collect();

    let artifact = ModelArtifact {
        feature_names,
        transform,
        catalog,
    };
    artifact.validate()?;
    info!(
        "Built catalog of {} songs from {}",
        artifact.catalog.len(),
        source
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "track_id,track_name,track_artist,track_popularity,track_album_release_date,playlist_genre,playlist_subgenre,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,duration_ms";

    fn csv_data(rows: &[&str]) -> String {
        let mut data = String::from(HEADER);
        for row in rows {
            data.push('\n');
            data.push_str(row);
        }
        data
    }

    #[test]
    fn test_builds_catalog_in_csv_order() {
        let data = csv_data(&[
            "id1,Song A,Artist 1,50,2019-01-01,pop,dance pop,0.7,0.8,1,-5.0,1,0.05,0.1,0.0,0.1,0.6,120.0,200000",
            "id2,Song B,Artist 2,70,2018,rock,hard rock,0.4,0.9,5,-4.0,0,0.04,0.01,0.2,0.3,0.4,140.0,240000",
            "id3,Song C,Artist 3,30,,edm,electro house,0.8,0.95,7,-3.0,1,0.06,0.02,0.5,0.2,0.3,128.0,180000",
        ]);
        let artifact = train_from_reader(data.as_bytes(), "test").unwrap();

        let ids: Vec<&str> = artifact.catalog.iter().map(|s| s.track_id.as_str()).collect();
        assert_eq!(ids, vec!["id1", "id2", "id3"]);
        assert_eq!(
            &artifact.feature_names[12..],
            &[
                "playlist_genre_pop".to_string(),
                "playlist_genre_rock".to_string(),
                "playlist_subgenre_electro house".to_string(),
                "playlist_subgenre_hard rock".to_string(),
            ]
        );
        assert_eq!(artifact.catalog[1].genre.as_deref(), Some("rock"));
        assert_eq!(artifact.catalog[1].track_popularity, 70);
        assert!(artifact
            .catalog
            .iter()
            .all(|s| s.feature_vector.len() == artifact.feature_names.len()));

        // Normalized columns are centered.
        let energy_sum: f64 = artifact.catalog.iter().map(|s| s.feature_vector[1]).sum();
        assert!(energy_sum.abs() < 1e-9);
    }

    #[test]
    fn test_drops_incomplete_rows() {
        let data = csv_data(&[
            "id1,Song A,Artist 1,50,2019,pop,dance pop,0.7,0.8,1,-5.0,1,0.05,0.1,0.0,0.1,0.6,120.0,200000",
            "id2,,Artist 2,70,2018,rock,hard rock,0.4,0.9,5,-4.0,0,0.04,0.01,0.2,0.3,0.4,140.0,240000",
            "id3,Song C,Artist 3,30,2017,edm,electro house,0.8,n/a,7,-3.0,1,0.06,0.02,0.5,0.2,0.3,128.0,180000",
            "id4,Song D,Artist 4,60,2016,rock,,0.5,0.5,2,-6.0,1,0.03,0.2,0.0,0.1,0.5,100.0,210000",
        ]);
        let artifact = train_from_reader(data.as_bytes(), "test").unwrap();
        assert_eq!(artifact.catalog.len(), 1);
        assert_eq!(artifact.catalog[0].track_id, "id1");
        // A single genre and subgenre leave only the audio columns.
        assert_eq!(artifact.feature_names.len(), AUDIO_FEATURES.len());
    }

    #[test]
    fn test_no_usable_rows() {
        let data = csv_data(&["id1,,,,,,,,,,,,,,,,,,"]);
        assert!(matches!(
            train_from_reader(data.as_bytes(), "empty.csv"),
            Err(TrainError::NoUsableRows(source)) if source == "empty.csv"
        ));
    }
}

//! Song recommendations by cosine similarity over a trained audio feature
//! space.
//!
//! A model is built offline from a songs CSV ([`trainer`]), written as one
//! versioned [`artifact`], and served read-only by a [`Recommender`].

pub mod artifact;
pub mod error;
pub mod feature_space;
pub mod index;
pub mod recommend;
pub mod server;
pub mod song;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use error::{ModelError, RecommendError, TrainError};
pub use recommend::{ModelState, NameRecommendation, Recommender};
pub use song::{SongItem, SongRecord};

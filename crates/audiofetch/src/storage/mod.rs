pub mod filesystem;

pub use filesystem::{ArtifactName, ArtifactStorage, StoredArtifact};

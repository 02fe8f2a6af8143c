use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::StorageError;
use crate::format::AudioFormat;
use crate::identifier::is_valid_identifier;

/// Hidden subdirectory of the downloads directory holding in-progress
/// extractions. It never parses as an artifact name.
const STAGING_DIR: &str = ".partial";

/// Deterministic on-disk name of an artifact: `{identifier}.{format}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    pub identifier: String,
    pub format: AudioFormat,
}

impl ArtifactName {
    pub fn new(identifier: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            identifier: identifier.into(),
            format,
        }
    }

    /// Parses a file name back into its identifier and format. Anything
    /// that is not exactly `{identifier}.{format}` (partial downloads,
    /// path separators, unknown extensions) is rejected.
    pub fn parse(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if !is_valid_identifier(stem) {
            return None;
        }
        let format = ext.parse::<AudioFormat>().ok()?;
        if ext != format.extension() {
            return None;
        }
        Some(Self::new(stem, format))
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.identifier, self.format.extension())
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.identifier, self.format.extension())
    }
}

/// An artifact found on disk.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub name: ArtifactName,
    pub modified: SystemTime,
}

/// The downloads directory holding every produced artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    directory: PathBuf,
}

impl ArtifactStorage {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    pub fn path_for(&self, name: &ArtifactName) -> PathBuf {
        self.directory.join(name.file_name())
    }

    /// Per-format working directory. Downloads of the same video in
    /// different formats never share intermediate files.
    pub fn staging_directory(&self, format: AudioFormat) -> PathBuf {
        self.directory.join(STAGING_DIR).join(format.extension())
    }

    pub fn ensure_staging_directory(&self, format: AudioFormat) -> Result<PathBuf, StorageError> {
        let path = self.staging_directory(format);
        std::fs::create_dir_all(&path).map_err(|e| StorageError::CreateDirectory {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Output template handed to the extraction tool. The tool substitutes
    /// the extension after post-processing, so the finished file lands at
    /// [`ArtifactStorage::staged_path`].
    pub fn output_template(&self, identifier: &str, format: AudioFormat) -> PathBuf {
        self.staging_directory(format).join(format!("{}.%(ext)s", identifier))
    }

    pub fn staged_path(&self, name: &ArtifactName) -> PathBuf {
        self.staging_directory(name.format).join(name.file_name())
    }

    /// Moves a finished file from its staging directory into place.
    /// Returns false when nothing was staged.
    pub fn promote(&self, name: &ArtifactName) -> Result<bool, StorageError> {
        let from = self.staged_path(name);
        if !from.is_file() {
            return Ok(false);
        }
        let to = self.path_for(name);
        std::fs::rename(&from, &to).map_err(|e| StorageError::Promote {
            from,
            to,
            source: e,
        })?;
        Ok(true)
    }

    /// Removes whatever a failed extraction left in the staging directory
    /// for `name`. Returns the number of files deleted.
    pub fn discard_staged(&self, name: &ArtifactName) -> Result<usize, StorageError> {
        let dir = self.staging_directory(name.format);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::ReadDirectory { path: dir, source: e }),
        };

        let prefix = format!("{}.", name.identifier);
        let mut removed = 0;
        for entry in entries.flatten() {
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|f| f.starts_with(&prefix));
            if !matches {
                continue;
            }
            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::RemoveFile { path, source: e }),
            }
        }
        Ok(removed)
    }

    pub fn exists(&self, name: &ArtifactName) -> bool {
        self.path_for(name).is_file()
    }

    /// Removes the artifact file. A file that is already gone is not an
    /// error; returns whether something was deleted.
    pub fn remove(&self, name: &ArtifactName) -> Result<bool, StorageError> {
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::RemoveFile { path, source: e }),
        }
    }

    /// Lists every file in the directory that parses as an artifact name.
    pub fn list_artifacts(&self) -> Result<Vec<StoredArtifact>, StorageError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadDirectory {
                    path: self.directory.clone(),
                    source: e,
                })
            }
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::ReadDirectory {
                path: self.directory.clone(),
                source: e,
            })?;
            let Some(name) = entry.file_name().to_str().and_then(ArtifactName::parse) else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            artifacts.push(StoredArtifact {
                name,
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_name_round_trip() {
        let name = ArtifactName::new("abc12345678", AudioFormat::Mp3);
        assert_eq!(name.file_name(), "abc12345678.mp3");
        assert_eq!(ArtifactName::parse("abc12345678.mp3"), Some(name));
    }

    #[test]
    fn test_artifact_name_rejects_foreign_files() {
        assert_eq!(ArtifactName::parse("abc12345678.webm"), None);
        assert_eq!(ArtifactName::parse("abc12345678.mp3.part"), None);
        assert_eq!(ArtifactName::parse("../etc/passwd.mp3"), None);
        assert_eq!(ArtifactName::parse("abc12345678.MP3"), None);
        assert_eq!(ArtifactName::parse("noextension"), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path());
        let name = ArtifactName::new("abc12345678", AudioFormat::Wav);

        std::fs::write(storage.path_for(&name), b"RIFF").unwrap();
        assert!(storage.exists(&name));

        assert!(storage.remove(&name).unwrap());
        assert!(!storage.exists(&name));
        assert!(!storage.remove(&name).unwrap());
    }

    #[test]
    fn test_list_artifacts_skips_partial_downloads() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path().join("downloads"));
        storage.ensure_directory().unwrap();

        std::fs::write(storage.directory().join("abc12345678.mp3"), b"x").unwrap();
        std::fs::write(storage.directory().join("abc12345678.webm.part"), b"x").unwrap();
        std::fs::write(storage.directory().join("notes.txt"), b"x").unwrap();

        let artifacts = storage.list_artifacts().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name.file_name(), "abc12345678.mp3");
    }

    #[test]
    fn test_list_artifacts_on_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path().join("nope"));
        assert!(storage.list_artifacts().unwrap().is_empty());
    }

    #[test]
    fn test_output_template_is_per_format() {
        let storage = ArtifactStorage::new("/data/downloads");
        assert_eq!(
            storage.output_template("abc12345678", AudioFormat::Mp3),
            PathBuf::from("/data/downloads/.partial/mp3/abc12345678.%(ext)s")
        );
        assert_ne!(
            storage.output_template("abc12345678", AudioFormat::Mp3).parent(),
            storage.output_template("abc12345678", AudioFormat::Wav).parent()
        );
    }

    #[test]
    fn test_promote_moves_staged_file_into_place() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path());
        let name = ArtifactName::new("abc12345678", AudioFormat::Flac);

        assert!(!storage.promote(&name).unwrap());

        storage.ensure_staging_directory(AudioFormat::Flac).unwrap();
        std::fs::write(storage.staged_path(&name), b"fLaC").unwrap();
        assert!(storage.promote(&name).unwrap());
        assert!(storage.exists(&name));
        assert!(!storage.staged_path(&name).exists());
    }

    #[test]
    fn test_discard_staged_only_touches_one_video() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path());
        let dir = storage.ensure_staging_directory(AudioFormat::Mp3).unwrap();
        std::fs::write(dir.join("abc12345678.webm.part"), b"x").unwrap();
        std::fs::write(dir.join("abc12345678.webm"), b"x").unwrap();
        std::fs::write(dir.join("zzz12345678.webm.part"), b"x").unwrap();

        let name = ArtifactName::new("abc12345678", AudioFormat::Mp3);
        assert_eq!(storage.discard_staged(&name).unwrap(), 2);
        assert!(dir.join("zzz12345678.webm.part").exists());
    }

    #[test]
    fn test_staging_directory_is_not_listed() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(temp_dir.path());
        let dir = storage.ensure_staging_directory(AudioFormat::Mp3).unwrap();
        std::fs::write(dir.join("abc12345678.mp3"), b"x").unwrap();
        assert!(storage.list_artifacts().unwrap().is_empty());
    }
}

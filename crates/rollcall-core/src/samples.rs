//! Enrollment image store: one directory of face crops per identity label.
//!
//! Layout: `<root>/<label>/face_<uuid>.png`. The store is the training corpus
//! the model can always be rebuilt from.

use crate::frame::FaceImage;
use crate::labels::{self, LabelError};
use crate::trainer::FaceSample;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum SampleStoreError {
    #[error("sample store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid label: {0}")]
    InvalidLabel(#[from] LabelError),
}

#[derive(Debug, Clone)]
pub struct SampleStore {
    root: PathBuf,
}

impl SampleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one crop into the label's directory and return its path.
    pub fn save(&self, label: &str, face: &FaceImage) -> Result<PathBuf, SampleStoreError> {
        labels::validate_label(label)?;
        let dir = self.root.join(label);
        std::fs::create_dir_all(&dir).map_err(|source| io_err(&dir, source))?;

        let path = dir.join(format!("face_{}.png", uuid::Uuid::new_v4().simple()));
        face.to_gray_image()
            .save(&path)
            .map_err(|source| SampleStoreError::Image {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(label, path = %path.display(), "sample saved");
        Ok(path)
    }

    /// Labels with a directory in the store, sorted.
    pub fn labels(&self) -> Result<Vec<String>, SampleStoreError> {
        let mut labels = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(labels),
            Err(source) => return Err(io_err(&self.root, source)),
        };

        for entry in entries {
            let entry = entry.map_err(|source| io_err(&self.root, source))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if labels::validate_label(&name).is_ok() {
                labels.push(name);
            }
        }

        labels.sort();
        Ok(labels)
    }

    /// Decode every stored crop of one label, in file-name order.
    ///
    /// Undecodable files are skipped with a warning.
    pub fn load_label(&self, label: &str) -> Result<Vec<FaceSample>, SampleStoreError> {
        labels::validate_label(label)?;
        let mut samples = Vec::new();
        for path in image_files(&self.root.join(label))? {
            match image::open(&path) {
                Ok(img) => samples.push(FaceSample::new(label, FaceImage::from(img.to_luma8()))),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable sample"
                    );
                }
            }
        }
        Ok(samples)
    }

    /// Decode the whole corpus: labels sorted, files sorted within each label.
    pub fn load_all(&self) -> Result<Vec<FaceSample>, SampleStoreError> {
        let mut samples = Vec::new();
        for label in self.labels()? {
            samples.extend(self.load_label(&label)?);
        }
        Ok(samples)
    }

    /// Delete a label's directory. Returns false if it did not exist.
    pub fn remove(&self, label: &str) -> Result<bool, SampleStoreError> {
        labels::validate_label(label)?;
        let dir = self.root.join(label);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_err(&dir, source)),
        }
    }

    /// Best-effort removal of freshly saved samples. A label directory left
    /// empty is removed too.
    pub fn discard(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to discard sample");
            }
        }
        let mut dirs: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
        dirs.dedup();
        for dir in dirs {
            // Fails harmlessly when other samples remain.
            let _ = std::fs::remove_dir(dir);
        }
    }

    /// Copy a folder-per-label training directory into the store, resizing
    /// each crop to `face_size`. Returns the number of images imported.
    pub fn import_dir(&self, source: &Path, face_size: u32) -> Result<usize, SampleStoreError> {
        let mut imported = 0usize;
        let entries = std::fs::read_dir(source).map_err(|e| io_err(source, e))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(label) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Err(e) = labels::validate_label(label) {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping training folder");
                continue;
            }

            for path in image_files(&dir)? {
                let face = match image::open(&path) {
                    Ok(img) => FaceImage::from(img.to_luma8()),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping unreadable image"
                        );
                        continue;
                    }
                };
                let Ok(face) = face.resize(face_size) else {
                    continue;
                };
                self.save(label, &face)?;
                imported += 1;
            }
        }

        tracing::info!(source = %source.display(), imported, "training directory imported");
        Ok(imported)
    }
}

fn image_files(dir: &Path) -> Result<Vec<PathBuf>, SampleStoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_err(dir, source)),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
        })
        .collect();
    files.sort();
    Ok(files)
}

fn io_err(path: &Path, source: std::io::Error) -> SampleStoreError {
    SampleStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(seed: u8) -> FaceImage {
        FaceImage::new(4, 4, (0..16).map(|i| seed.wrapping_add(i * 9)).collect()).unwrap()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path());
        store.save("S001", &face(10)).unwrap();
        store.save("S001", &face(10)).unwrap();

        let samples = store.load_label("S001").unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.label == "S001" && s.image == face(10)));
    }

    #[test]
    fn test_labels_sorted_and_missing_root_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path().join("samples"));
        assert!(store.labels().unwrap().is_empty());

        store.save("S002", &face(1)).unwrap();
        store.save("S001", &face(2)).unwrap();
        assert_eq!(store.labels().unwrap(), vec!["S001", "S002"]);
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_load_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path());
        store.save("S001", &face(3)).unwrap();
        std::fs::write(dir.path().join("S001/broken.png"), b"nope").unwrap();
        std::fs::write(dir.path().join("S001/notes.txt"), b"ignored").unwrap();

        assert_eq!(store.load_label("S001").unwrap().len(), 1);
    }

    #[test]
    fn test_save_rejects_bad_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path());
        assert!(matches!(
            store.save("../escape", &face(0)),
            Err(SampleStoreError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_remove_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path());
        store.save("S001", &face(4)).unwrap();
        assert!(store.remove("S001").unwrap());
        assert!(!store.remove("S001").unwrap());
        assert!(store.labels().unwrap().is_empty());
    }

    #[test]
    fn test_discard_keeps_older_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::new(dir.path());
        store.save("S001", &face(1)).unwrap();
        let fresh = vec![store.save("S001", &face(2)).unwrap()];
        let other = vec![store.save("S002", &face(3)).unwrap()];

        store.discard(&fresh);
        store.discard(&other);

        assert_eq!(store.load_label("S001").unwrap().len(), 1);
        assert_eq!(store.labels().unwrap(), vec!["S001"]);
    }

    #[test]
    fn test_import_dir_resizes() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("alice")).unwrap();
        face(5).to_gray_image().save(src.path().join("alice/a.png")).unwrap();
        std::fs::create_dir(src.path().join("bad label")).unwrap();

        let store = SampleStore::new(dst.path());
        assert_eq!(store.import_dir(src.path(), 8).unwrap(), 1);

        let samples = store.load_all().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!((samples[0].image.width(), samples[0].image.height()), (8, 8));
    }
}

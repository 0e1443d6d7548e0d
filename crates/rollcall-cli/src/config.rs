use anyhow::{Context, Result};
use rollcall_core::RecognitionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// CLI configuration: built-in defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the model blob and the sample store.
    pub data_dir: PathBuf,
    /// Path to the serialized identity model.
    pub model_path: PathBuf,
    /// Directory holding one folder of face crops per label.
    pub samples_dir: PathBuf,
    pub recognition: RecognitionConfig,
}

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    model_path: Option<PathBuf>,
    samples_dir: Option<PathBuf>,
    recognition: RecognitionConfig,
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| lookup("ROLLCALL_CONFIG").map(PathBuf::from));
        Self::resolve(path.as_deref(), lookup)
    }

    fn resolve(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                toml::from_str::<FileConfig>(&text)
                    .with_context(|| format!("parsing config file {}", p.display()))?
            }
            None => FileConfig::default(),
        };

        let data_dir = lookup("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&lookup));

        let model_path = lookup("ROLLCALL_MODEL_PATH")
            .map(PathBuf::from)
            .or(file.model_path)
            .unwrap_or_else(|| data_dir.join("face_recognition_model.json"));

        let samples_dir = lookup("ROLLCALL_SAMPLES_DIR")
            .map(PathBuf::from)
            .or(file.samples_dir)
            .unwrap_or_else(|| data_dir.join("faces"));

        let base = file.recognition;
        let recognition = RecognitionConfig {
            face_size: env_parse(&lookup, "ROLLCALL_FACE_SIZE", base.face_size),
            max_distance: env_parse(&lookup, "ROLLCALL_MAX_DISTANCE", base.max_distance),
            min_samples: env_parse(&lookup, "ROLLCALL_MIN_SAMPLES", base.min_samples),
            max_capture_frames: env_parse(
                &lookup,
                "ROLLCALL_MAX_CAPTURE_FRAMES",
                base.max_capture_frames,
            ),
            capture_timeout_secs: env_parse(
                &lookup,
                "ROLLCALL_CAPTURE_TIMEOUT_SECS",
                base.capture_timeout_secs,
            ),
            dark_threshold: env_parse(&lookup, "ROLLCALL_DARK_THRESHOLD", base.dark_threshold),
        };

        anyhow::ensure!(recognition.face_size > 0, "face_size must be positive");
        anyhow::ensure!(
            recognition.max_distance > 0.0,
            "max_distance must be positive"
        );

        Ok(Self {
            data_dir,
            model_path,
            samples_dir,
            recognition,
        })
    }
}

fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_under_xdg_data_home() {
        let cfg = Config::resolve(None, env(&[("XDG_DATA_HOME", "/srv/data")])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/data/rollcall"));
        assert_eq!(cfg.model_path, PathBuf::from("/srv/data/rollcall/face_recognition_model.json"));
        assert_eq!(cfg.samples_dir, PathBuf::from("/srv/data/rollcall/faces"));
        assert_eq!(cfg.recognition, RecognitionConfig::default());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "data_dir = \"/var/lib/rollcall\"\n\n[recognition]\nmax_distance = 0.2\nmin_samples = 7\n",
        )
        .unwrap();

        let cfg = Config::resolve(Some(&path), env(&[("ROLLCALL_MIN_SAMPLES", "9")])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/rollcall"));
        assert!((cfg.recognition.max_distance - 0.2).abs() < 1e-6);
        assert_eq!(cfg.recognition.min_samples, 9);
        assert_eq!(cfg.recognition.face_size, 100);
    }

    #[test]
    fn test_unparseable_env_keeps_default() {
        let cfg = Config::resolve(
            None,
            env(&[("HOME", "/home/x"), ("ROLLCALL_FACE_SIZE", "big")]),
        )
        .unwrap();
        assert_eq!(cfg.recognition.face_size, 100);
        assert_eq!(cfg.data_dir, PathBuf::from("/home/x/.local/share/rollcall"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "camera = 0\n").unwrap();
        assert!(Config::resolve(Some(&path), env(&[])).is_err());
    }

    #[test]
    fn test_zero_face_size_rejected() {
        assert!(Config::resolve(None, env(&[("ROLLCALL_FACE_SIZE", "0")])).is_err());
    }
}

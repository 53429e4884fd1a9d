use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::{
    error::LoadError,
    model::{DigitClassifier, DigitClassifierConfig, DigitClassifierRecord},
};

/// File name of the architecture descriptor.
pub const ARCHITECTURE_FILE: &str = "mnist_model.json";
/// File name of the trained weights.
pub const WEIGHTS_FILE: &str = "mnist_model_weights.mpk";

/// Locations of the two model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub architecture: PathBuf,
    pub weights: PathBuf,
}

impl ArtifactPaths {
    pub fn new(architecture: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        Self {
            architecture: architecture.into(),
            weights: weights.into(),
        }
    }

    /// The standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(ARCHITECTURE_FILE), dir.join(WEIGHTS_FILE))
    }
}

impl Default for ArtifactPaths {
    /// The standard file names in the current working directory.
    fn default() -> Self {
        Self::new(ARCHITECTURE_FILE, WEIGHTS_FILE)
    }
}

/// Serialization scheme of the weights file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    /// Burn named MessagePack record, full precision.
    NamedMpk,
    /// PyTorch `state_dict` saved with `torch.save`.
    PyTorch,
}

impl WeightsFormat {
    /// Picks the format from the file extension: `mpk`, `pt` or `pth`.
    pub fn detect(path: &Path) -> Result<Self, LoadError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("mpk") => Ok(Self::NamedMpk),
            Some("pt" | "pth") => Ok(Self::PyTorch),
            other => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("unknown weights extension {other:?}, expected mpk, pt or pth"),
            }),
        }
    }
}

type Mpk = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Architecture descriptor and trained weights, as read from disk.
pub struct ModelArtifacts<B: Backend> {
    pub config: DigitClassifierConfig,
    pub record: DigitClassifierRecord<B>,
}

impl<B: Backend> ModelArtifacts<B> {
    /// Reads both artifacts without building the classifier.
    pub fn load(paths: &ArtifactPaths, device: &B::Device) -> Result<Self, LoadError> {
        let config = DigitClassifierConfig::load(&paths.architecture).map_err(|err| {
            LoadError::Architecture {
                path: paths.architecture.clone(),
                reason: err.to_string(),
            }
        })?;
        let record = load_weights(&paths.weights, device)?;

        Ok(Self { config, record })
    }

    /// Captures the current parameters of `classifier`.
    pub fn from_classifier(config: DigitClassifierConfig, classifier: DigitClassifier<B>) -> Self {
        Self {
            config,
            record: classifier.into_record(),
        }
    }

    /// Builds the classifier, checking that the weights fit the descriptor.
    ///
    /// The result only runs forward passes: gradients are disabled on every parameter.
    pub fn into_classifier(
        self,
        paths: &ArtifactPaths,
        device: &B::Device,
    ) -> Result<DigitClassifier<B>, LoadError> {
        self.config
            .validate()
            .map_err(|reason| LoadError::InvalidArchitecture {
                path: paths.architecture.clone(),
                reason,
            })?;

        let expected = self.config.parameter_shapes();
        let actual = self.record.parameter_shapes();
        for ((name, expected), (_, actual)) in expected.into_iter().zip(actual) {
            if expected != actual {
                return Err(LoadError::Incompatible {
                    path: paths.weights.clone(),
                    name,
                    expected,
                    actual,
                });
            }
        }

        let classifier = self.config.init_with(self.record, device).no_grad();

        Ok(classifier)
    }

    /// Writes the descriptor as JSON and the weights as named MessagePack.
    pub fn save(self, paths: &ArtifactPaths) -> Result<(), LoadError> {
        if WeightsFormat::detect(&paths.weights)? != WeightsFormat::NamedMpk {
            return Err(LoadError::UnsupportedFormat {
                path: paths.weights.clone(),
                reason: "weights can only be written as mpk".to_string(),
            });
        }

        self.config
            .save(&paths.architecture)
            .map_err(|err| LoadError::Save {
                path: paths.architecture.clone(),
                reason: err.to_string(),
            })?;

        Mpk::default()
            .record(self.record, paths.weights.clone())
            .map_err(|err| LoadError::Save {
                path: paths.weights.clone(),
                reason: err.to_string(),
            })
    }
}

fn load_weights<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<DigitClassifierRecord<B>, LoadError> {
    match WeightsFormat::detect(path)? {
        WeightsFormat::NamedMpk => Mpk::default()
            .load(path.to_path_buf(), device)
            .map_err(|source| LoadError::Weights {
                path: path.to_path_buf(),
                source,
            }),
        #[cfg(feature = "pytorch")]
        WeightsFormat::PyTorch => import_pytorch(path, &[], device),
        #[cfg(not(feature = "pytorch"))]
        WeightsFormat::PyTorch => Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "PyTorch weights need the `pytorch` feature".to_string(),
        }),
    }
}

/// Reads a PyTorch `state_dict`, renaming keys with `(pattern, replacement)` regex pairs first.
#[cfg(feature = "pytorch")]
pub fn import_pytorch<B: Backend>(
    path: &Path,
    remaps: &[(String, String)],
    device: &B::Device,
) -> Result<DigitClassifierRecord<B>, LoadError> {
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    let args = remaps
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|source| LoadError::Weights {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads the artifact pair into a ready, inference-only classifier.
pub fn load_classifier<B: Backend>(
    paths: &ArtifactPaths,
    device: &B::Device,
) -> Result<DigitClassifier<B>, LoadError> {
    let classifier = ModelArtifacts::<B>::load(paths, device)?.into_classifier(paths, device)?;

    log::info!(
        "Loaded digit classifier from {} and {} ({:?} input, {} parameters)",
        paths.architecture.display(),
        paths.weights.display(),
        classifier.input_shape(),
        classifier.num_params(),
    );

    Ok(classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grid::PixelGrid, inference::Predictor, TestBackend};

    fn small_config() -> DigitClassifierConfig {
        DigitClassifierConfig::new()
            .with_conv_channels([2, 4])
            .with_hidden_size(16)
    }

    fn write_artifacts(dir: &Path, config: DigitClassifierConfig) -> ArtifactPaths {
        let device = Default::default();
        let paths = ArtifactPaths::in_dir(dir);
        let classifier = config.init::<TestBackend>(&device);

        ModelArtifacts::from_classifier(config, classifier)
            .save(&paths)
            .expect("Should save artifacts");

        paths
    }

    #[test]
    fn default_paths_are_in_working_directory() {
        let paths = ArtifactPaths::default();

        assert_eq!(paths.architecture, PathBuf::from("mnist_model.json"));
        assert_eq!(paths.weights, PathBuf::from("mnist_model_weights.mpk"));
    }

    #[test]
    fn detects_weights_format_from_extension() {
        let detect = |path: &str| WeightsFormat::detect(Path::new(path)).ok();

        assert_eq!(detect("w.pth"), Some(WeightsFormat::PyTorch));
        assert_eq!(detect("w.pt"), Some(WeightsFormat::PyTorch));
        assert_eq!(detect("w.mpk"), Some(WeightsFormat::NamedMpk));
        assert_eq!(detect("w.bin"), None);
        assert_eq!(detect("weights"), None);
    }

    #[test]
    fn weights_path_is_used_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let saved = write_artifacts(dir.path(), small_config());
        // A sibling `.mpk` exists, but the named file does not.
        let paths = ArtifactPaths::new(
            &saved.architecture,
            dir.path().join("mnist_model_weights.bin"),
        );

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::UnsupportedFormat { .. }), "{err}");
    }

    #[test]
    fn save_refuses_other_weights_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = small_config();
        let classifier = config.init::<TestBackend>(&device);
        let paths = ArtifactPaths::new(
            dir.path().join("mnist_model.json"),
            dir.path().join("w.bin"),
        );

        let err = ModelArtifacts::from_classifier(config, classifier)
            .save(&paths)
            .unwrap_err();

        assert!(matches!(err, LoadError::UnsupportedFormat { .. }), "{err}");
        assert!(!dir.path().join("w.bin").exists());
        assert!(!dir.path().join("w.mpk").exists());
    }

    #[test]
    fn saved_artifacts_reload_to_the_same_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = small_config();
        let original = config.init::<TestBackend>(&device);
        let paths = ArtifactPaths::in_dir(dir.path());
        ModelArtifacts::from_classifier(config, original.clone())
            .save(&paths)
            .unwrap();

        let loaded = load_classifier::<TestBackend>(&paths, &device).unwrap();

        let grid = PixelGrid::from_bytes(
            28,
            28,
            &(0..28 * 28).map(|i| (i * 13 % 256) as u8).collect::<Vec<_>>(),
        )
        .unwrap();
        let before: Predictor<TestBackend> = Predictor::new(original);
        let after: Predictor<TestBackend> = Predictor::new(loaded);
        assert_eq!(before.predict(&grid).unwrap(), after.predict(&grid).unwrap());
        assert_eq!(after.input_shape(), [28, 28]);
    }

    #[test]
    fn missing_architecture_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), small_config());
        std::fs::remove_file(&paths.architecture).unwrap();

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::Architecture { .. }), "{err}");
    }

    #[test]
    fn missing_weights_fail() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), small_config());
        std::fs::remove_file(&paths.weights).unwrap();

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::Weights { .. }), "{err}");
    }

    #[test]
    fn corrupt_weights_fail() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), small_config());
        std::fs::write(&paths.weights, b"not a record").unwrap();

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::Weights { .. }), "{err}");
    }

    #[test]
    fn weights_from_another_architecture_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), small_config().with_hidden_size(24));
        // Descriptor now disagrees with the stored weights.
        small_config().save(&paths.architecture).unwrap();

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(
            matches!(
                err,
                LoadError::Incompatible {
                    name: "linear1.weight",
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_artifacts(dir.path(), small_config());
        small_config()
            .with_kernel_size(0)
            .save(&paths.architecture)
            .unwrap();

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::InvalidArchitecture { .. }), "{err}");
    }

    #[cfg(not(feature = "pytorch"))]
    #[test]
    fn pytorch_weights_need_the_feature() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_artifacts(dir.path(), small_config());
        paths.weights = dir.path().join("mnist_model_weights.pth");

        let err = load_classifier::<TestBackend>(&paths, &Default::default()).unwrap_err();

        assert!(matches!(err, LoadError::UnsupportedFormat { .. }), "{err}");
    }

    #[cfg(feature = "pytorch")]
    mod pytorch {
        use super::*;

        const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/pytorch");

        /// Descriptor matching the fixtures written by `tests/pytorch/export_weights.py`.
        fn fixture_paths(dir: &Path, weights: &str) -> ArtifactPaths {
            let paths = ArtifactPaths::new(
                dir.join("mnist_model.json"),
                Path::new(FIXTURES).join(weights),
            );
            small_config().save(&paths.architecture).unwrap();
            paths
        }

        #[test]
        fn loads_state_dict_with_matching_names() {
            let dir = tempfile::tempdir().unwrap();
            let paths = fixture_paths(dir.path(), "digit_classifier.pt");

            let classifier = load_classifier::<TestBackend>(&paths, &Default::default())
                .expect("Should decode state successfully");

            assert_eq!(classifier.parameter_shapes(), small_config().parameter_shapes());
            let predictor: Predictor<TestBackend> = Predictor::new(classifier);
            let grid = PixelGrid::filled(28, 28, 128.0).unwrap();
            assert_eq!(predictor.predict(&grid).unwrap().get(), 7);
        }

        #[test]
        fn key_remaps_rename_layers() {
            let device = Default::default();
            let path = Path::new(FIXTURES).join("digit_classifier_renamed.pt");
            let remaps = [
                (r"^fc1\.(.+)$".to_string(), "linear1.$1".to_string()),
                (r"^fc2\.(.+)$".to_string(), "linear2.$1".to_string()),
            ];

            let record = import_pytorch::<TestBackend>(&path, &remaps, &device)
                .expect("Should decode state successfully");

            // Linear weights come back transposed to `[d_input, d_output]`.
            assert_eq!(record.parameter_shapes(), small_config().parameter_shapes());
            let paths = ArtifactPaths::new("mnist_model.json", &path);
            let classifier = ModelArtifacts {
                config: small_config(),
                record,
            }
            .into_classifier(&paths, &device)
            .unwrap();
            let predictor: Predictor<TestBackend> = Predictor::new(classifier);
            assert_eq!(
                predictor.predict(&PixelGrid::filled(28, 28, 0.0).unwrap()).unwrap().get(),
                7
            );
        }
    }
}

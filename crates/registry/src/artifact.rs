//! Per-run model bundles on disk.

use crate::error::{RegistryError, Result};
use crate::types::RunId;
use dataset::{FeatureVocabulary, IndexSpace};
use models::{Algorithm, FittedModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Everything serving needs from one run: the model and the id mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub algorithm: Algorithm,
    pub model: FittedModel,
    pub index: IndexSpace,
    pub vocabulary: Option<FeatureVocabulary>,
}

/// Directory of `<run_id>.json` bundles.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Write the bundle completely, then move it into place.
    #[instrument(skip(self, bundle), fields(algorithm = %bundle.algorithm))]
    pub fn save(&self, run_id: RunId, bundle: &ModelBundle) -> Result<PathBuf> {
        let path = self.path_for(run_id);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, bundle)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| RegistryError::Io(e.error))?;
        info!("Saved artifact {}", path.display());
        Ok(path)
    }

    pub fn load(&self, run_id: RunId) -> Result<ModelBundle> {
        Self::load_path(&self.path_for(run_id)).map_err(|e| match e {
            RegistryError::Io(io) if io.kind() == ErrorKind::NotFound => {
                RegistryError::ArtifactNotFound(run_id)
            }
            other => other,
        })
    }

    pub fn load_path(path: &Path) -> Result<ModelBundle> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::InteractionMatrix;
    use models::{BaselineTrainer, TrainParams, TrainableModel};

    fn bundle() -> ModelBundle {
        let matrix = InteractionMatrix::from_triples(1, 2, [(0, 0, 4.0), (0, 1, 2.0)]);
        let model = BaselineTrainer
            .fit(&matrix, None, None, &TrainParams::default())
            .unwrap();
        ModelBundle {
            algorithm: Algorithm::Baseline,
            model,
            index: IndexSpace::from_ids([7], [70, 71]),
            vocabulary: None,
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("artifacts")).unwrap();
        let run_id = RunId::new();

        let path = store.save(run_id, &bundle()).unwrap();
        assert!(path.ends_with(format!("{}.json", run_id)));

        let loaded = store.load(run_id).unwrap();
        assert_eq!(loaded.algorithm, Algorithm::Baseline);
        assert_eq!(loaded.index.item_ids(), &[70, 71]);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load(RunId::new()),
            Err(RegistryError::ArtifactNotFound(_))
        ));
    }
}

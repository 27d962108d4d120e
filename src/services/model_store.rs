use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::ModelType,
    services::affinity::TrainedModel,
};

/// File-backed model persistence, one slot per model type
///
/// Writes land in a temporary file in the same directory and are renamed over
/// the slot, so a concurrent `load` sees either the old or the new model.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, model_type: ModelType) -> PathBuf {
        self.dir.join(format!("{}.json", model_type))
    }

    /// Persists `model` into the slot for `model_type`
    pub fn save(&self, model_type: ModelType, model: &TrainedModel) -> AppResult<PathBuf> {
        if model.model_type() != model_type {
            return Err(AppError::InvalidInput(format!(
                "Cannot store a {} model in the {} slot",
                model.model_type(),
                model_type
            )));
        }

        fs::create_dir_all(&self.dir)?;

        let target = self.path_for(model_type);
        let temp = self
            .dir
            .join(format!(".{}.{}.tmp", model_type, Uuid::new_v4()));

        let json = serde_json::to_vec(model)?;
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        tracing::info!(
            model_type = %model_type,
            path = %target.display(),
            bytes = json.len(),
            generation = %model.generation(),
            "Model saved"
        );

        Ok(target)
    }

    /// Restores the model in the slot for `model_type`
    ///
    /// An empty slot is `Ok(None)`. A file that does not decode into a
    /// consistent model of the right type is `AppError::Persistence`.
    pub fn load(&self, model_type: ModelType) -> AppResult<Option<TrainedModel>> {
        let path = self.path_for(model_type);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(model_type = %model_type, "No persisted model");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let model: TrainedModel = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Persistence(format!("{}: {}", path.display(), e)))?;

        if model.model_type() != model_type {
            return Err(AppError::Persistence(format!(
                "{} holds a {} model",
                path.display(),
                model.model_type()
            )));
        }
        model.validate()?;

        tracing::info!(
            model_type = %model_type,
            path = %path.display(),
            generation = %model.generation(),
            trained_at = %model.trained_at,
            "Model loaded"
        );

        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::affinity::{test_support::*, TrainingConfig};

    fn temp_store() -> ModelStore {
        ModelStore::new(std::env::temp_dir().join(format!("affinity-store-{}", Uuid::new_v4())))
    }

    fn trained(model_type: ModelType) -> TrainedModel {
        TrainedModel::train(model_type, &shared_taste_dataset(), &TrainingConfig::default()).unwrap()
    }

    #[test]
    fn test_load_from_empty_slot_is_none() {
        let store = temp_store();
        assert!(store.load(ModelType::LatentFactor).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_reproduces_predictions() {
        let store = temp_store();
        for model_type in ModelType::ALL {
            let model = trained(model_type);
            store.save(model_type, &model).unwrap();

            let restored = store.load(model_type).unwrap().unwrap();
            for user in ["A", "B", "nobody"] {
                for id in ["1", "2", "3"] {
                    assert_eq!(restored.predict(user, &movie(id)), model.predict(user, &movie(id)));
                }
            }
        }
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let store = temp_store();
        store.save(ModelType::LatentFactor, &trained(ModelType::LatentFactor)).unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["latent_factor.json".to_string()]);
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn test_wrong_slot_rejected_on_save() {
        let store = temp_store();
        let result = store.save(ModelType::EmbeddingRanker, &trained(ModelType::LatentFactor));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_corrupt_file_reported_as_persistence_error() {
        let store = temp_store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path_for(ModelType::EmbeddingRanker), b"{\"trained_at\": ").unwrap();

        let result = store.load(ModelType::EmbeddingRanker);
        assert!(matches!(result, Err(AppError::Persistence(_))));
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn test_model_in_wrong_slot_reported_as_persistence_error() {
        let store = temp_store();
        store.save(ModelType::LatentFactor, &trained(ModelType::LatentFactor)).unwrap();
        fs::rename(
            store.path_for(ModelType::LatentFactor),
            store.path_for(ModelType::EmbeddingRanker),
        )
        .unwrap();

        let result = store.load(ModelType::EmbeddingRanker);
        assert!(matches!(result, Err(AppError::Persistence(_))));
        let _ = fs::remove_dir_all(store.dir());
    }
}

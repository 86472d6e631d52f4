// ============================================================
// Layer 6 — Pretrained Registry
// ============================================================
// Resolves a pretrained model name to weights on disk:
//
//   <dir>/<name>.pt   a checkpoint package (or best file) whose
//                     `model` section holds the weights
//
// The stored architecture name must match the model the weights
// are loaded into.

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::path::PathBuf;

use crate::domain::traits::PretrainedRegistry;
use crate::infra::checkpoint::{decode_record, CheckpointPackage, MODEL};
use crate::ml::contracts::EnhancementModel;

pub struct DirectoryRegistry<B: Backend> {
    dir:    PathBuf,
    device: B::Device,
}

impl<B: Backend> DirectoryRegistry<B> {
    pub fn new(dir: impl Into<PathBuf>, device: B::Device) -> Self {
        Self { dir: dir.into(), device }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.pt"))
    }
}

impl<B: Backend, M: EnhancementModel<B>> PretrainedRegistry<M> for DirectoryRegistry<B> {
    fn fetch(&self, name: &str, template: M) -> Result<M> {
        let path = self.path_of(name);
        let package = CheckpointPackage::read(&path)
            .with_context(|| format!("Unknown pretrained model '{name}'"))?;

        let expected = template.descriptor();
        if package.architecture.name != expected.name {
            bail!(
                "pretrained model '{}' is a '{}', cannot load it into a '{}'",
                name,
                package.architecture.name,
                expected.name
            );
        }

        let bytes = package.require(MODEL, &path)?;
        let record = decode_record::<B, M::Record>(bytes, MODEL, &self.device)?;
        tracing::info!("Loaded pretrained weights '{}' from '{}'", name, path.display());
        Ok(template.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::History;
    use crate::infra::checkpoint::encode_record;
    use crate::ml::baseline::{ConvDenoiser, ConvDenoiserConfig};
    use crate::ml::contracts::ModelDescriptor;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_weights_are_loaded_by_name() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let registry = DirectoryRegistry::<TestBackend>::new(dir.path(), device);

        let source: ConvDenoiser<TestBackend> = ConvDenoiserConfig::new().init(&device);
        CheckpointPackage::new(source.descriptor(), History::new(), serde_json::Value::Null)
            .with_section(MODEL, encode_record::<TestBackend, _>(source.clone().into_record(), MODEL).unwrap())
            .write(&registry.path_of("dns48"))
            .unwrap();

        let loaded = registry
            .fetch("dns48", ConvDenoiserConfig::new().init::<TestBackend>(&device))
            .unwrap();
        let x = Tensor::<TestBackend, 2>::ones([1, 40], &device);
        assert_eq!(source.forward(x.clone()).into_data(), loaded.forward(x).into_data());
    }

    #[test]
    fn test_unknown_name_and_wrong_architecture_fail() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let registry = DirectoryRegistry::<TestBackend>::new(dir.path(), device);
        let template = || ConvDenoiserConfig::new().init::<TestBackend>(&device);

        assert!(registry.fetch("absent", template()).is_err());

        CheckpointPackage::new(
            ModelDescriptor { name: "other".into(), config: serde_json::Value::Null },
            History::new(),
            serde_json::Value::Null,
        )
        .write(&registry.path_of("foreign"))
        .unwrap();
        let err = registry.fetch("foreign", template()).unwrap_err();
        assert!(err.to_string().contains("cannot load it into"));
    }
}

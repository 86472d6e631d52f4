// ============================================================
// Layer 6 — Checkpoint Package
// ============================================================
// Everything needed to resume a run, in one file:
//
//   ┌──────────────────────────────┐
//   │ magic  "TAPCKPT\x01"  8 B    │
//   │ header length         u64 LE │
//   │ header                JSON   │  format, architecture,
//   │                              │  optimizer kind, history,
//   │                              │  config snapshot, sections
//   │ section bytes ...            │  model / optimizer / best_state
//   └──────────────────────────────┘
//
// Each section is a Burn record encoded with BinBytesRecorder at
// full precision; the header's section table gives its offset
// (from the end of the header) and length.
//
// Files are written to `<path>.tmp`, synced, then renamed over
// the target, so readers only ever see a complete package.
//
// The best file uses the same container with a single `model`
// section holding the best weights.

use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{error::CheckpointError, history::History, kinds::OptimizerKind};
use crate::ml::contracts::ModelDescriptor;

const MAGIC: &[u8; 8] = b"TAPCKPT\x01";
pub const FORMAT_VERSION: u32 = 1;

/// Section names
pub const MODEL: &str = "model";
pub const OPTIMIZER: &str = "optimizer";
pub const BEST_STATE: &str = "best_state";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionEntry {
    name:   String,
    offset: u64,
    len:    u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    format:         u32,
    architecture:   ModelDescriptor,
    optimizer_kind: Option<OptimizerKind>,
    history:        History,
    config:         serde_json::Value,
    sections:       Vec<SectionEntry>,
}

/// In-memory form of a checkpoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointPackage {
    pub architecture:   ModelDescriptor,
    /// Kind of the optimizer whose state is in the `optimizer` section
    pub optimizer_kind: Option<OptimizerKind>,
    pub history:        History,
    pub config:         serde_json::Value,
    sections:           BTreeMap<String, Vec<u8>>,
}

impl CheckpointPackage {
    pub fn new(architecture: ModelDescriptor, history: History, config: serde_json::Value) -> Self {
        Self {
            architecture,
            optimizer_kind: None,
            history,
            config,
            sections: BTreeMap::new(),
        }
    }

    pub fn with_section(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.sections.insert(name.to_string(), bytes);
        self
    }

    pub fn with_optimizer(mut self, kind: OptimizerKind, bytes: Vec<u8>) -> Self {
        self.optimizer_kind = Some(kind);
        self.with_section(OPTIMIZER, bytes)
    }

    pub fn section(&self, name: &str) -> Option<&[u8]> {
        self.sections.get(name).map(Vec::as_slice)
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    /// Like `section`, but a missing section is an error naming `path`.
    pub fn require(&self, name: &str, path: &Path) -> Result<&[u8], CheckpointError> {
        self.section(name).ok_or_else(|| CheckpointError::MissingSection {
            path:    path.to_path_buf(),
            section: name.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        let mut entries = Vec::with_capacity(self.sections.len());
        let mut offset = 0u64;
        for (name, bytes) in &self.sections {
            entries.push(SectionEntry { name: name.clone(), offset, len: bytes.len() as u64 });
            offset += bytes.len() as u64;
        }
        let header = Header {
            format:         FORMAT_VERSION,
            architecture:   self.architecture.clone(),
            optimizer_kind: self.optimizer_kind,
            history:        self.history.clone(),
            config:         self.config.clone(),
            sections:       entries,
        };
        let header = serde_json::to_vec(&header).map_err(|e| CheckpointError::Record {
            section: "header".to_string(),
            reason:  e.to_string(),
        })?;

        let mut out = Vec::with_capacity(16 + header.len() + offset as usize);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        for bytes in self.sections.values() {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    /// Parse a package; `path` is only used in error messages.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, CheckpointError> {
        let corrupt = |reason: String| CheckpointError::Corrupt { path: path.to_path_buf(), reason };

        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CheckpointError::BadMagic(path.to_path_buf()));
        }
        let rest = &bytes[MAGIC.len()..];
        let len_bytes: [u8; 8] = rest
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| corrupt("truncated header length".to_string()))?;
        let header_len = u64::from_le_bytes(len_bytes) as usize;
        let rest = &rest[8..];
        let header_bytes = rest
            .get(..header_len)
            .ok_or_else(|| corrupt(format!("header claims {header_len} bytes, file is shorter")))?;
        let header: Header = serde_json::from_slice(header_bytes)
            .map_err(|e| corrupt(format!("unreadable header: {e}")))?;
        if header.format != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", header.format)));
        }

        let body = &rest[header_len..];
        let mut sections = BTreeMap::new();
        for entry in header.sections {
            let start = entry.offset as usize;
            let end = start
                .checked_add(entry.len as usize)
                .filter(|&end| end <= body.len())
                .ok_or_else(|| corrupt(format!("section '{}' is truncated", entry.name)))?;
            sections.insert(entry.name, body[start..end].to_vec());
        }

        Ok(Self {
            architecture:   header.architecture,
            optimizer_kind: header.optimizer_kind,
            history:        header.history,
            config:         header.config,
            sections,
        })
    }

    /// Atomically replace `path` with this package.
    pub fn write(&self, path: &Path) -> Result<(), CheckpointError> {
        write_atomic(path, &self.to_bytes()?)
    }

    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        let bytes = fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, path)
    }
}

/// Write to `<path>.tmp`, sync, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let io = |source| CheckpointError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).map_err(io)?;
    file.write_all(bytes).map_err(io)?;
    file.sync_all().map_err(io)?;
    drop(file);
    fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

/// Encode a Burn record as section bytes.
pub fn encode_record<B: Backend, R: Record<B>>(
    record:  R,
    section: &str,
) -> Result<Vec<u8>, CheckpointError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(&recorder, record, ())
        .map_err(|e| CheckpointError::Record { section: section.to_string(), reason: e.to_string() })
}

/// Decode section bytes back into a Burn record on `device`.
pub fn decode_record<B: Backend, R: Record<B>>(
    bytes:   &[u8],
    section: &str,
    device:  &B::Device,
) -> Result<R, CheckpointError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load::<R>(&recorder, bytes.to_vec(), device)
        .map_err(|e| CheckpointError::Record { section: section.to_string(), reason: e.to_string() })
}

/// `<dir>/checkpoint_epoch_<epoch>.pt`
pub fn periodic_path(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!("checkpoint_epoch_{epoch}.pt"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::EpochRecord;
    use crate::ml::baseline::{ConvDenoiser, ConvDenoiserConfig};
    use crate::ml::contracts::EnhancementModel;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn package() -> CheckpointPackage {
        let mut history = History::new();
        history.push(EpochRecord { train: 1.0, valid: 0.5, best: 0.5, pesq: None, stoi: None });
        CheckpointPackage::new(
            ModelDescriptor { name: "m".into(), config: serde_json::json!({ "k": 3 }) },
            history,
            serde_json::json!({ "epochs": 4 }),
        )
        .with_section(MODEL, vec![1, 2, 3])
        .with_section(BEST_STATE, vec![9])
        .with_optimizer(OptimizerKind::Adam, vec![7, 7])
    }

    #[test]
    fn test_package_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/checkpoint.th");
        let original = package();
        original.write(&path).unwrap();

        let loaded = CheckpointPackage::read(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.section(OPTIMIZER), Some(&[7u8, 7][..]));
        assert_eq!(loaded.optimizer_kind, Some(OptimizerKind::Adam));
        assert!(!dir.path().join("nested/checkpoint.th.tmp").exists());
    }

    #[test]
    fn test_bad_magic_and_truncation_are_detected() {
        let path = Path::new("ckpt");
        assert!(matches!(
            CheckpointPackage::from_bytes(b"NOTACKPT........", path),
            Err(CheckpointError::BadMagic(_))
        ));

        let bytes = package().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 2];
        assert!(matches!(
            CheckpointPackage::from_bytes(cut, path),
            Err(CheckpointError::Corrupt { .. })
        ));
        assert!(matches!(
            CheckpointPackage::from_bytes(&bytes[..12], path),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_missing_file_and_section() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.th");
        assert!(matches!(CheckpointPackage::read(&missing), Err(CheckpointError::Io { .. })));

        let bare = CheckpointPackage::new(
            ModelDescriptor { name: "m".into(), config: serde_json::Value::Null },
            History::new(),
            serde_json::Value::Null,
        );
        assert!(matches!(
            bare.require(BEST_STATE, &missing),
            Err(CheckpointError::MissingSection { .. })
        ));
    }

    #[test]
    fn test_model_record_round_trip() {
        let device = Default::default();
        let model: ConvDenoiser<TestBackend> = ConvDenoiserConfig::new().with_channels(2).init(&device);
        let bytes = encode_record::<TestBackend, _>(model.clone().into_record(), MODEL).unwrap();

        let fresh: ConvDenoiser<TestBackend> = ConvDenoiserConfig::new().with_channels(2).init(&device);
        let record = decode_record::<TestBackend, _>(&bytes, MODEL, &device).unwrap();
        let restored = fresh.load_record(record);

        let x = Tensor::<TestBackend, 2>::ones([1, 32], &device);
        assert_eq!(
            model.forward(x.clone()).into_data(),
            restored.forward(x).into_data()
        );
    }

    #[test]
    fn test_garbage_record_is_an_error() {
        let device = Default::default();
        let result = decode_record::<TestBackend, <ConvDenoiser<TestBackend> as Module<TestBackend>>::Record>(
            &[0xff, 0x00, 0x13],
            MODEL,
            &device,
        );
        assert!(matches!(result, Err(CheckpointError::Record { .. })));
    }

    #[test]
    fn test_periodic_name() {
        assert_eq!(
            periodic_path(Path::new("checkpoints"), 3),
            PathBuf::from("checkpoints/checkpoint_epoch_3.pt")
        );
    }
}

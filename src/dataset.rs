//! Dataset facade: per-phase iterable views over a generated split.
//!
//! Subsets preserve the split engine's sample ordering and never alter split
//! membership; they only decode images and apply the phase's transform
//! pipeline at access time.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_RANDOM_SEED;
use crate::metadata::Metadata;
use crate::split::{PatientRatioSplit, SplitStrategy};
use crate::transforms::TransformPipeline;
use crate::types::{CapsuleError, DatasetResult, FindingClass, Sample};

/// One decoded, transformed training example.
#[derive(Debug, Clone)]
pub struct DatasetItem {
    /// CHW layout, normalized.
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    /// YOLO-format box (x_center, y_center, width, height), normalized, if
    /// the sample carries one.
    pub bbox: Option<[f32; 4]>,
    pub label: FindingClass,
}

/// Indexable view over the samples one phase received.
pub struct CapsuleSubset {
    phase: String,
    samples: Vec<Sample>,
    transform: TransformPipeline,
    root: PathBuf,
}

impl CapsuleSubset {
    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Decode and transform the sample at `index`.
    pub fn get(&self, index: usize) -> DatasetResult<DatasetItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            CapsuleError::Other(format!(
                "index {index} out of bounds for phase '{}' with {} samples",
                self.phase,
                self.samples.len()
            ))
        })?;
        let path = sample.image_path(&self.root);
        let img = image::open(&path)
            .map_err(|e| CapsuleError::Image {
                path: path.clone(),
                source: e,
            })?
            .to_rgb8();
        let bbox = sample.bbox.as_ref().map(|b| b.to_yolo());
        let out = self.transform.apply(img, bbox, sample.frame_number);
        Ok(DatasetItem {
            image_chw: out.image_chw,
            width: out.width,
            height: out.height,
            bbox: out.bbox,
            label: sample.finding_class,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = DatasetResult<DatasetItem>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }
}

/// Facade tying a metadata index and a patient-ratio split together.
pub struct CapsuleDataset {
    root: PathBuf,
    metadata: Metadata,
    split: PatientRatioSplit,
}

impl CapsuleDataset {
    /// Open a dataset rooted at `root` with an already-populated split.
    pub fn open(root: impl Into<PathBuf>, split: PatientRatioSplit) -> DatasetResult<Self> {
        let root = root.into();
        Self::check_manifest(&root)?;
        let metadata = Metadata::load(&root)?;
        Ok(Self {
            root,
            metadata,
            split,
        })
    }

    /// Open with the default 0.8/0.1/0.1 split, generated with the sort
    /// strategy and the default seed.
    pub fn with_defaults(root: impl Into<PathBuf>) -> DatasetResult<Self> {
        let root = root.into();
        Self::check_manifest(&root)?;
        let metadata = Metadata::load(&root)?;
        let mut split = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
        split.generate(&metadata, SplitStrategy::default(), DEFAULT_RANDOM_SEED)?;
        Ok(Self {
            root,
            metadata,
            split,
        })
    }

    fn check_manifest(root: &Path) -> DatasetResult<()> {
        if !root.is_dir() {
            return Err(CapsuleError::MissingData {
                path: root.to_path_buf(),
                msg: "not a directory".to_string(),
            });
        }
        if !root.join("metadata.csv").is_file() {
            return Err(CapsuleError::MissingData {
                path: root.to_path_buf(),
                msg: "metadata.csv not found".to_string(),
            });
        }
        Ok(())
    }

    /// Strict structural check: manifest present plus one populated image
    /// directory per finding class. Used after download/extraction.
    pub fn validate_layout(root: &Path) -> DatasetResult<()> {
        Self::check_manifest(root)?;
        for class in FindingClass::ALL {
            let dir = root.join(class.dirname());
            if !dir.is_dir() {
                return Err(CapsuleError::MissingData {
                    path: root.to_path_buf(),
                    msg: format!("missing class directory '{}'", class.dirname()),
                });
            }
            let populated = fs::read_dir(&dir)
                .map_err(|e| CapsuleError::Io {
                    path: dir.clone(),
                    source: e,
                })?
                .next()
                .is_some();
            if !populated {
                return Err(CapsuleError::MissingData {
                    path: root.to_path_buf(),
                    msg: format!("class directory '{}' is empty", class.dirname()),
                });
            }
        }
        Ok(())
    }

    /// Non-failing variant of [`CapsuleDataset::validate_layout`].
    pub fn exists(root: &Path) -> bool {
        Self::validate_layout(root).is_ok()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn split(&self) -> &PatientRatioSplit {
        &self.split
    }

    /// View over one phase, using that phase's default transform pipeline.
    pub fn subset(&self, phase: &str) -> DatasetResult<CapsuleSubset> {
        self.subset_with_transform(phase, TransformPipeline::for_phase(phase))
    }

    /// View over one phase with a caller-supplied pipeline.
    pub fn subset_with_transform(
        &self,
        phase: &str,
        transform: TransformPipeline,
    ) -> DatasetResult<CapsuleSubset> {
        let samples = self.split.samples(phase).ok_or_else(|| {
            CapsuleError::Other(format!("split has no phase '{phase}'"))
        })?;
        Ok(CapsuleSubset {
            phase: phase.to_string(),
            samples: samples.to_vec(),
            transform,
            root: self.root.clone(),
        })
    }

    pub fn train(&self) -> DatasetResult<CapsuleSubset> {
        self.subset("train")
    }

    pub fn val(&self) -> DatasetResult<CapsuleSubset> {
        self.subset("val")
    }

    pub fn test(&self) -> DatasetResult<CapsuleSubset> {
        self.subset("test")
    }
}

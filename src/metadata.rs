//! Loading and indexing the metadata.csv manifest.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bbox::BoundingBox;
use crate::types::{CapsuleError, DatasetResult, FindingCategory, FindingClass, Sample};

/// One manifest row as it appears on disk. Bounding-box columns are optional
/// both per-row (empty fields) and wholesale (columns absent from the
/// header).
#[derive(Debug, Deserialize)]
struct ManifestRow {
    filename: String,
    video_id: String,
    frame_number: u64,
    finding_category: String,
    finding_class: String,
    #[serde(default)]
    x1: Option<f64>,
    #[serde(default)]
    y1: Option<f64>,
    #[serde(default)]
    x2: Option<f64>,
    #[serde(default)]
    y2: Option<f64>,
    #[serde(default)]
    x3: Option<f64>,
    #[serde(default)]
    y3: Option<f64>,
    #[serde(default)]
    x4: Option<f64>,
    #[serde(default)]
    y4: Option<f64>,
}

/// All samples of one patient within one finding class, in manifest order.
#[derive(Debug, Clone)]
pub struct PatientGroup {
    pub video_id: String,
    pub samples: Vec<Sample>,
}

/// Typed view over metadata.csv: the flat sample list plus the derived
/// lookups the split engine consumes.
#[derive(Debug, Clone)]
pub struct Metadata {
    root: PathBuf,
    samples: Vec<Sample>,
}

impl Metadata {
    /// Parse `<root>/metadata.csv` (semicolon-delimited) into sample
    /// records. Unrecognized category or class strings are fatal; rows with
    /// any missing bounding-box coordinate get `bbox: None`.
    pub fn load(root: impl Into<PathBuf>) -> DatasetResult<Self> {
        let root = root.into();
        let path = root.join("metadata.csv");
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .map_err(|e| CapsuleError::Csv {
                path: path.clone(),
                source: e,
            })?;

        let mut samples = Vec::new();
        for row in reader.deserialize() {
            let row: ManifestRow = row.map_err(|e| CapsuleError::Csv {
                path: path.clone(),
                source: e,
            })?;
            let finding_category = FindingCategory::from_str_loose(&row.finding_category)?;
            let finding_class = FindingClass::from_str_loose(&row.finding_class)?;
            let coords = [
                row.x1, row.y1, row.x2, row.y2, row.x3, row.y3, row.x4, row.y4,
            ];
            let bbox = if coords.iter().any(Option::is_none) {
                None
            } else {
                let c: Vec<i64> = coords
                    .iter()
                    .map(|v| v.unwrap_or_default().round() as i64)
                    .collect();
                Some(BoundingBox::from_kvasir_capsule(
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ))
            };
            samples.push(Sample {
                filename: row.filename,
                video_id: row.video_id,
                frame_number: row.frame_number,
                finding_category,
                finding_class,
                bbox,
            });
        }

        Ok(Self { root, samples })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Number of distinct patients (video ids) across the whole manifest.
    pub fn num_patients(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.video_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Lookup table keyed by sample filename. Filenames are unique across
    /// the dataset.
    pub fn samples_by_filename(&self) -> HashMap<&str, &Sample> {
        self.samples
            .iter()
            .map(|sample| (sample.filename.as_str(), sample))
            .collect()
    }

    /// Group samples by finding class, then by patient. Classes iterate in a
    /// fixed order; patients within a class keep their first-encounter order
    /// from the manifest, which the split engine uses as its tie-break.
    pub fn samples_by_class_by_patient(&self) -> BTreeMap<FindingClass, Vec<PatientGroup>> {
        let mut grouped: BTreeMap<FindingClass, Vec<PatientGroup>> = BTreeMap::new();
        for sample in &self.samples {
            let groups = grouped.entry(sample.finding_class).or_default();
            match groups.iter_mut().find(|g| g.video_id == sample.video_id) {
                Some(group) => group.samples.push(sample.clone()),
                None => groups.push(PatientGroup {
                    video_id: sample.video_id.clone(),
                    samples: vec![sample.clone()],
                }),
            }
        }
        grouped
    }

    /// Reduced index containing only the requested classes. `include = None`
    /// keeps everything not excluded.
    pub fn filter(
        &self,
        include: Option<&[FindingClass]>,
        exclude: &[FindingClass],
    ) -> Metadata {
        let samples = self
            .samples
            .iter()
            .filter(|s| include.is_none_or(|inc| inc.contains(&s.finding_class)))
            .filter(|s| !exclude.contains(&s.finding_class))
            .cloned()
            .collect();
        Metadata {
            root: self.root.clone(),
            samples,
        }
    }
}

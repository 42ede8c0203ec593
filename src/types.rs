//! Core types, error definitions, and the sample record.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bbox::BoundingBox;

pub type DatasetResult<T> = Result<T, CapsuleError>;

#[derive(Debug, Error)]
pub enum CapsuleError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("csv parse error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("download failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("checksum mismatch for {filename}: expected {expected}, downloaded {actual}")]
    Checksum {
        filename: String,
        expected: String,
        actual: String,
    },
    #[error("split ratios must sum to 1.0, got {sum}")]
    RatioSum { sum: f64 },
    #[error(
        "first phase '{phase}' of class {class:?} would receive {count} of {patients} patients; \
         ratios are too fine-grained for this class"
    )]
    SplitInvariant {
        phase: String,
        class: FindingClass,
        count: i64,
        patients: usize,
    },
    #[error("split references unknown filename '{filename}'; metadata does not match the saved split")]
    UnknownFilename { filename: String },
    #[error("unknown finding category '{value}', expected 'luminal' or 'anatomy'")]
    UnknownCategory { value: String },
    #[error("unknown finding class '{value}' (slug '{slug}')")]
    UnknownClass { value: String, slug: String },
    #[error("invalid bounding box: {msg}")]
    InvalidBox { msg: String },
    #[error("dataset at {path} is incomplete: {msg}")]
    MissingData { path: PathBuf, msg: String },
    #[error("{0}")]
    Other(String),
}

/// Broad grouping of findings in the Kvasir-Capsule taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingCategory {
    Luminal,
    Anatomy,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 2] = [FindingCategory::Luminal, FindingCategory::Anatomy];

    /// Translate a manifest string. Case-insensitive; surrounding whitespace
    /// is ignored. Anything else is a fatal parse error.
    pub fn from_str_loose(s: &str) -> DatasetResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "luminal" => Ok(FindingCategory::Luminal),
            "anatomy" => Ok(FindingCategory::Anatomy),
            _ => Err(CapsuleError::UnknownCategory {
                value: s.to_string(),
            }),
        }
    }

    /// All finding classes belonging to this category.
    pub fn classes(&self) -> &'static [FindingClass] {
        match self {
            FindingCategory::Luminal => &[
                FindingClass::Angiectasia,
                FindingClass::BloodFresh,
                FindingClass::BloodHematin,
                FindingClass::Erosion,
                FindingClass::Erythema,
                FindingClass::ForeignBody,
                FindingClass::Lymphangiectasia,
                FindingClass::NormalCleanMucosa,
                FindingClass::Polyp,
                FindingClass::ReducedMucosalView,
                FindingClass::Ulcer,
            ],
            FindingCategory::Anatomy => &[
                FindingClass::AmpullaOfVater,
                FindingClass::IleocecalValve,
                FindingClass::Pylorus,
            ],
        }
    }
}

/// The 14 Kvasir-Capsule finding classes. Discriminants are the training
/// label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingClass {
    AmpullaOfVater = 0,
    Angiectasia = 1,
    BloodFresh = 2,
    BloodHematin = 3,
    Erosion = 4,
    Erythema = 5,
    ForeignBody = 6,
    IleocecalValve = 7,
    Lymphangiectasia = 8,
    NormalCleanMucosa = 9,
    Polyp = 10,
    Pylorus = 11,
    ReducedMucosalView = 12,
    Ulcer = 13,
}

impl FindingClass {
    pub const ALL: [FindingClass; 14] = [
        FindingClass::AmpullaOfVater,
        FindingClass::Angiectasia,
        FindingClass::BloodFresh,
        FindingClass::BloodHematin,
        FindingClass::Erosion,
        FindingClass::Erythema,
        FindingClass::ForeignBody,
        FindingClass::IleocecalValve,
        FindingClass::Lymphangiectasia,
        FindingClass::NormalCleanMucosa,
        FindingClass::Polyp,
        FindingClass::Pylorus,
        FindingClass::ReducedMucosalView,
        FindingClass::Ulcer,
    ];

    /// Translate a manifest string or directory name. Spaces and dashes are
    /// stripped before lookup so "Blood - fresh" and "bloodfresh" both match.
    pub fn from_str_loose(s: &str) -> DatasetResult<Self> {
        let slug: String = s
            .to_lowercase()
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .collect();
        let class = match slug.as_str() {
            "ampullaofvater" => FindingClass::AmpullaOfVater,
            "angiectasia" => FindingClass::Angiectasia,
            "bloodfresh" => FindingClass::BloodFresh,
            "bloodhematin" => FindingClass::BloodHematin,
            "erosion" => FindingClass::Erosion,
            "erythema" => FindingClass::Erythema,
            "foreignbody" => FindingClass::ForeignBody,
            "ileocecalvalve" => FindingClass::IleocecalValve,
            "lymphangiectasia" => FindingClass::Lymphangiectasia,
            "normalcleanmucosa" => FindingClass::NormalCleanMucosa,
            "polyp" => FindingClass::Polyp,
            "pylorus" => FindingClass::Pylorus,
            "reducedmucosalview" => FindingClass::ReducedMucosalView,
            "ulcer" => FindingClass::Ulcer,
            _ => {
                return Err(CapsuleError::UnknownClass {
                    value: s.to_string(),
                    slug,
                })
            }
        };
        Ok(class)
    }

    /// Folder name in the original Kvasir-Capsule archive layout. Folders
    /// must not be renamed on disk.
    pub fn dirname(&self) -> &'static str {
        match self {
            FindingClass::AmpullaOfVater => "Ampulla of vater",
            FindingClass::Angiectasia => "Angiectasia",
            FindingClass::BloodFresh => "Blood - fresh",
            FindingClass::BloodHematin => "Blood - hematin",
            FindingClass::Erosion => "Erosion",
            FindingClass::Erythema => "Erythema",
            FindingClass::ForeignBody => "Foreign body",
            FindingClass::IleocecalValve => "Ileocecal valve",
            FindingClass::Lymphangiectasia => "Lymphangiectasia",
            FindingClass::NormalCleanMucosa => "Normal clean mucosa",
            FindingClass::Polyp => "Polyp",
            FindingClass::Pylorus => "Pylorus",
            FindingClass::ReducedMucosalView => "Reduced mucosal view",
            FindingClass::Ulcer => "Ulcer",
        }
    }

    pub fn category(&self) -> FindingCategory {
        match self {
            FindingClass::AmpullaOfVater | FindingClass::IleocecalValve | FindingClass::Pylorus => {
                FindingCategory::Anatomy
            }
            _ => FindingCategory::Luminal,
        }
    }

    /// Numeric training label.
    pub fn label(&self) -> u32 {
        *self as u32
    }
}

/// One manifest record: an image, its owning patient video, its label, and
/// an optional bounding box. Immutable after construction; built only by the
/// metadata index.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub filename: String,
    pub video_id: String,
    pub frame_number: u64,
    pub finding_category: FindingCategory,
    pub finding_class: FindingClass,
    pub bbox: Option<BoundingBox>,
}

impl Sample {
    /// On-disk location relative to the dataset root.
    pub fn image_path(&self, root: &Path) -> PathBuf {
        root.join(self.finding_class.dirname()).join(&self.filename)
    }
}

//! Patient-aware stratified splitting.
//!
//! Samples are partitioned into named phases (train/val/test or arbitrary)
//! per finding class, assigning whole patients so no patient's frames leak
//! across phases. The assignment round-trips through a JSON file so
//! experiments can be reproduced exactly.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::DEFAULT_RANDOM_SEED;
use crate::metadata::Metadata;
use crate::types::{CapsuleError, DatasetResult, Sample};

/// How patient groups are ordered before phases claim their share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Largest patient groups first; deterministic without randomness. The
    /// first declared phase ends up with the bulk of the sample volume.
    #[default]
    Sort,
    /// Seeded uniform permutation of patient groups.
    Shuffle,
}

/// Persisted form: `{ratios, seed, samples: {phase: [filename, ...]}}`.
/// Phase maps keep declaration order on disk (serde_json preserve_order),
/// and only filenames are stored; loading re-resolves them through a
/// metadata index.
#[derive(Serialize, Deserialize)]
struct SplitFile {
    ratios: Map<String, Value>,
    seed: u64,
    samples: Map<String, Value>,
}

/// Generalized ratio split that respects patient identity.
#[derive(Debug, Clone)]
pub struct PatientRatioSplit {
    /// Phase names with their fractional weights, in declaration order. The
    /// first phase is privileged: it absorbs the rounding remainder.
    ratios: Vec<(String, f64)>,
    seed: u64,
    samples: HashMap<String, Vec<Sample>>,
}

impl PatientRatioSplit {
    /// Fails with [`CapsuleError::RatioSum`] unless the weights sum to
    /// exactly 1.0 (IEEE, summed in declaration order).
    pub fn new<S: Into<String>>(
        ratios: impl IntoIterator<Item = (S, f64)>,
    ) -> DatasetResult<Self> {
        let ratios: Vec<(String, f64)> = ratios
            .into_iter()
            .map(|(phase, ratio)| (phase.into(), ratio))
            .collect();
        let sum: f64 = ratios.iter().map(|(_, ratio)| *ratio).sum();
        if sum != 1.0 {
            return Err(CapsuleError::RatioSum { sum });
        }
        Ok(Self {
            ratios,
            seed: DEFAULT_RANDOM_SEED,
            samples: HashMap::new(),
        })
    }

    /// Equal-ratio split with phases `fold0..fold{k-1}`.
    pub fn kfold(k: usize) -> DatasetResult<Self> {
        if k == 0 {
            return Err(CapsuleError::Other("kfold requires k > 0".to_string()));
        }
        Self::new((0..k).map(|i| (format!("fold{i}"), 1.0 / k as f64)))
    }

    pub fn ratios(&self) -> &[(String, f64)] {
        &self.ratios
    }

    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.ratios.iter().map(|(phase, _)| phase.as_str())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Samples assigned to a phase, in assignment order. `None` for unknown
    /// phases; empty before the first `generate`/`load`.
    pub fn samples(&self, phase: &str) -> Option<&[Sample]> {
        self.samples.get(phase).map(Vec::as_slice)
    }

    pub fn total_samples(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    /// Generate the phase assignment. Deterministic for a fixed strategy,
    /// seed, and metadata; replaces any prior assignment.
    ///
    /// Per finding class: patients are counted, each non-first phase claims
    /// `max(round(n * ratio), 1)` patients (round half to even), the first
    /// phase takes the remainder, and a single pointer walk hands out
    /// patient groups in the chosen order. Classes with fewer patients than
    /// phases are skipped with a warning and contribute no samples.
    pub fn generate(
        &mut self,
        metadata: &Metadata,
        strategy: SplitStrategy,
        seed: u64,
    ) -> DatasetResult<()> {
        self.seed = seed;
        self.samples = self
            .ratios
            .iter()
            .map(|(phase, _)| (phase.clone(), Vec::new()))
            .collect();

        for (finding_class, groups) in metadata.samples_by_class_by_patient() {
            let n_patients = groups.len();
            if n_patients < self.ratios.len() {
                warn!(
                    class = ?finding_class,
                    patients = n_patients,
                    phases = self.ratios.len(),
                    "too few patients to split class; it contributes no samples this run"
                );
                continue;
            }

            // Per-phase patient counts. Every non-first phase gets at least
            // one patient group so small classes still populate val/test;
            // the first phase absorbs whatever remains.
            let mut counts = vec![0usize; self.ratios.len()];
            let mut remainder = n_patients as i64;
            for (i, (_, ratio)) in self.ratios.iter().enumerate().skip(1) {
                let n = ((n_patients as f64 * ratio).round_ties_even() as i64).max(1);
                counts[i] = n as usize;
                remainder -= n;
            }
            if remainder <= 0 {
                return Err(CapsuleError::SplitInvariant {
                    phase: self.ratios[0].0.clone(),
                    class: finding_class,
                    count: remainder,
                    patients: n_patients,
                });
            }
            counts[0] = remainder as usize;

            let mut order: Vec<usize> = (0..n_patients).collect();
            match strategy {
                SplitStrategy::Sort => {
                    // Stable descending sort: ties keep manifest encounter
                    // order, and the biggest groups land in the first phase.
                    order.sort_by(|a, b| {
                        groups[*b].samples.len().cmp(&groups[*a].samples.len())
                    });
                }
                SplitStrategy::Shuffle => {
                    // Reseeded per class so a given seed yields the same
                    // permutation for a class regardless of which other
                    // classes are present in the manifest.
                    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                    order.shuffle(&mut rng);
                }
            }

            let mut pointer = 0;
            for ((phase, _), take) in self.ratios.iter().zip(&counts) {
                let bucket = self.samples.entry(phase.clone()).or_default();
                for &group_idx in &order[pointer..pointer + take] {
                    bucket.extend(groups[group_idx].samples.iter().cloned());
                }
                pointer += take;
            }
        }

        Ok(())
    }

    /// Serialize `{ratios, seed, samples}` to JSON. Only filenames are
    /// persisted; [`PatientRatioSplit::load`] re-resolves them.
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let mut ratios = Map::new();
        let mut samples = Map::new();
        for (phase, ratio) in &self.ratios {
            ratios.insert(phase.clone(), Value::from(*ratio));
            let filenames: Vec<Value> = self
                .samples
                .get(phase)
                .map(|phase_samples| {
                    phase_samples
                        .iter()
                        .map(|sample| Value::String(sample.filename.clone()))
                        .collect()
                })
                .unwrap_or_default();
            samples.insert(phase.clone(), Value::Array(filenames));
        }
        let file = SplitFile {
            ratios,
            seed: self.seed,
            samples,
        };
        let data = serde_json::to_vec_pretty(&file).map_err(|e| CapsuleError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| CapsuleError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reconstruct a saved split, resolving each stored filename through the
    /// supplied metadata. A filename missing from the metadata means the
    /// manifest no longer matches the split and is fatal.
    pub fn load(path: &Path, metadata: &Metadata) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| CapsuleError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: SplitFile = serde_json::from_slice(&raw).map_err(|e| CapsuleError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

        let ratios = file
            .ratios
            .iter()
            .map(|(phase, value)| {
                let ratio = value.as_f64().ok_or_else(|| {
                    CapsuleError::Other(format!("ratio for phase '{phase}' is not a number"))
                })?;
                Ok((phase.clone(), ratio))
            })
            .collect::<DatasetResult<Vec<_>>>()?;
        let mut split = PatientRatioSplit::new(ratios)?;
        split.seed = file.seed;

        let by_filename = metadata.samples_by_filename();
        for (phase, _) in &split.ratios {
            let filenames = file
                .samples
                .get(phase)
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    CapsuleError::Other(format!("missing sample list for phase '{phase}'"))
                })?;
            let mut resolved = Vec::with_capacity(filenames.len());
            for value in filenames {
                let filename = value.as_str().ok_or_else(|| {
                    CapsuleError::Other(format!("non-string sample entry in phase '{phase}'"))
                })?;
                let sample =
                    by_filename
                        .get(filename)
                        .ok_or_else(|| CapsuleError::UnknownFilename {
                            filename: filename.to_string(),
                        })?;
                resolved.push((*sample).clone());
            }
            split.samples.insert(phase.clone(), resolved);
        }
        Ok(split)
    }
}

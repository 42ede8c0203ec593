//! Split engine behavior over synthetic manifests.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Result;
use capsule_dataset::{CapsuleError, Metadata, PatientRatioSplit, SplitStrategy};

const HEADER: &str =
    "filename;video_id;frame_number;finding_category;finding_class;x1;y1;x2;y2;x3;y3;x4;y4\n";

/// Append `count` frames for one patient of the given class, without boxes.
fn add_patient(csv: &mut String, category: &str, class: &str, video_id: &str, count: usize) {
    for i in 0..count {
        writeln!(
            csv,
            "{video_id}_{i:05}.jpg;{video_id};{i};{category};{class};;;;;;;;"
        )
        .unwrap();
    }
}

fn write_manifest(root: &Path, csv: &str) -> Result<()> {
    fs::write(root.join("metadata.csv"), csv)?;
    Ok(())
}

fn phase_filenames(split: &PatientRatioSplit, phase: &str) -> Vec<String> {
    split
        .samples(phase)
        .unwrap_or_default()
        .iter()
        .map(|s| s.filename.clone())
        .collect()
}

fn phase_patients(split: &PatientRatioSplit, phase: &str) -> HashSet<String> {
    split
        .samples(phase)
        .unwrap_or_default()
        .iter()
        .map(|s| s.video_id.clone())
        .collect()
}

#[test]
fn sort_strategy_worked_example() -> Result<()> {
    // 10 patients with one sample each, 0.8/0.1/0.1: val and test each get
    // max(round(10 * 0.1), 1) = 1 patient, train gets the remaining 8.
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..10 {
        add_patient(&mut csv, "anatomy", "pylorus", &format!("v{p:02}"), 1);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    split.generate(&metadata, SplitStrategy::Sort, 0)?;

    assert_eq!(split.samples("train").unwrap().len(), 8);
    assert_eq!(split.samples("val").unwrap().len(), 1);
    assert_eq!(split.samples("test").unwrap().len(), 1);
    assert_eq!(split.total_samples(), metadata.num_samples());
    Ok(())
}

#[test]
fn sort_sends_largest_patients_to_first_phase() -> Result<()> {
    // Patient sizes 5,4,3,2,1 with 0.6/0.2/0.2: val and test get one
    // patient each, train gets three. Descending order means train holds
    // the 5+4+3 patients, val the 2, test the 1.
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for (p, size) in [5usize, 4, 3, 2, 1].iter().enumerate() {
        add_patient(&mut csv, "luminal", "polyp", &format!("v{p}"), *size);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.6), ("val", 0.2), ("test", 0.2)])?;
    split.generate(&metadata, SplitStrategy::Sort, 0)?;

    assert_eq!(split.samples("train").unwrap().len(), 12);
    assert_eq!(split.samples("val").unwrap().len(), 2);
    assert_eq!(split.samples("test").unwrap().len(), 1);
    assert_eq!(phase_patients(&split, "val"), HashSet::from(["v3".to_string()]));
    assert_eq!(phase_patients(&split, "test"), HashSet::from(["v4".to_string()]));
    Ok(())
}

#[test]
fn no_patient_is_fragmented_across_phases() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..9 {
        add_patient(&mut csv, "luminal", "ulcer", &format!("u{p}"), p + 1);
        add_patient(&mut csv, "anatomy", "pylorus", &format!("p{p}"), 3);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    for (strategy, seed) in [
        (SplitStrategy::Sort, 0),
        (SplitStrategy::Shuffle, 1),
        (SplitStrategy::Shuffle, 2),
        (SplitStrategy::Shuffle, 1337),
    ] {
        let mut split = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
        split.generate(&metadata, strategy, seed)?;

        // A patient appears in the manifest under one class only, so phase
        // patient sets must be pairwise disjoint.
        let train = phase_patients(&split, "train");
        let val = phase_patients(&split, "val");
        let test = phase_patients(&split, "test");
        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));

        // Nothing lost, nothing duplicated.
        assert_eq!(split.total_samples(), metadata.num_samples());
        let mut all = phase_filenames(&split, "train");
        all.extend(phase_filenames(&split, "val"));
        all.extend(phase_filenames(&split, "test"));
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());

        // Every phase received at least one patient from every class.
        for phase in ["train", "val", "test"] {
            let patients = phase_patients(&split, phase);
            assert!(patients.iter().any(|v| v.starts_with('u')));
            assert!(patients.iter().any(|v| v.starts_with('p')));
        }
    }
    Ok(())
}

#[test]
fn sort_strategy_is_bit_identical_across_runs() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..7 {
        add_patient(&mut csv, "luminal", "erosion", &format!("v{p}"), 2 + p % 3);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut a = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    let mut b = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    a.generate(&metadata, SplitStrategy::Sort, 0)?;
    b.generate(&metadata, SplitStrategy::Sort, 12345)?;
    for phase in ["train", "val", "test"] {
        assert_eq!(phase_filenames(&a, phase), phase_filenames(&b, phase));
    }
    Ok(())
}

#[test]
fn shuffle_is_reproducible_per_seed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..20 {
        add_patient(&mut csv, "luminal", "angiectasia", &format!("v{p:02}"), 1);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut a = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    let mut b = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    a.generate(&metadata, SplitStrategy::Shuffle, 42)?;
    b.generate(&metadata, SplitStrategy::Shuffle, 42)?;
    for phase in ["train", "val", "test"] {
        assert_eq!(phase_filenames(&a, phase), phase_filenames(&b, phase));
    }

    // A different seed permutes 20 patients differently with overwhelming
    // probability.
    let mut c = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    c.generate(&metadata, SplitStrategy::Shuffle, 43)?;
    assert_ne!(phase_filenames(&a, "train"), phase_filenames(&c, "train"));
    Ok(())
}

#[test]
fn regenerate_replaces_previous_assignment() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..6 {
        add_patient(&mut csv, "anatomy", "ileocecal valve", &format!("v{p}"), 2);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.5), ("val", 0.5)])?;
    split.generate(&metadata, SplitStrategy::Shuffle, 1)?;
    split.generate(&metadata, SplitStrategy::Shuffle, 1)?;
    assert_eq!(split.total_samples(), metadata.num_samples());
    assert_eq!(split.seed(), 1);
    Ok(())
}

#[test]
fn class_with_too_few_patients_is_skipped() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    // Two patients cannot fill three phases; this class must vanish.
    add_patient(&mut csv, "luminal", "blood - fresh", "b0", 4);
    add_patient(&mut csv, "luminal", "blood - fresh", "b1", 4);
    // A healthy class alongside still splits.
    for p in 0..5 {
        add_patient(&mut csv, "anatomy", "pylorus", &format!("p{p}"), 2);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.8), ("val", 0.1), ("test", 0.1)])?;
    split.generate(&metadata, SplitStrategy::Sort, 0)?;

    assert_eq!(split.total_samples(), 10);
    for phase in ["train", "val", "test"] {
        assert!(phase_patients(&split, phase)
            .iter()
            .all(|v| v.starts_with('p')));
    }
    Ok(())
}

#[test]
fn rounding_is_half_to_even() -> Result<()> {
    // Five single-sample patients at 0.5/0.5: the non-first phase asks for
    // round(2.5) = 2 under half-to-even, leaving three for the first phase.
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..5 {
        add_patient(&mut csv, "luminal", "erythema", &format!("v{p}"), 1);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.5), ("val", 0.5)])?;
    split.generate(&metadata, SplitStrategy::Sort, 0)?;
    assert_eq!(split.samples("train").unwrap().len(), 3);
    assert_eq!(split.samples("val").unwrap().len(), 2);
    Ok(())
}

#[test]
fn first_phase_starved_by_rounding_is_fatal() -> Result<()> {
    // Two patients at 0.25/0.75: the second phase rounds 1.5 up to 2 and
    // the first phase would get zero.
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    add_patient(&mut csv, "luminal", "lymphangiectasia", "v0", 1);
    add_patient(&mut csv, "luminal", "lymphangiectasia", "v1", 1);
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.25), ("val", 0.75)])?;
    let err = split
        .generate(&metadata, SplitStrategy::Sort, 0)
        .expect_err("first phase must not be starved");
    assert!(matches!(err, CapsuleError::SplitInvariant { .. }));
    Ok(())
}

#[test]
fn per_phase_order_preserves_patient_sample_order() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut csv = String::from(HEADER);
    for p in 0..4 {
        add_patient(&mut csv, "anatomy", "pylorus", &format!("v{p}"), 3);
    }
    write_manifest(tmp.path(), &csv)?;
    let metadata = Metadata::load(tmp.path())?;

    let mut split = PatientRatioSplit::new([("train", 0.5), ("val", 0.5)])?;
    split.generate(&metadata, SplitStrategy::Sort, 0)?;

    for phase in ["train", "val"] {
        for window in split.samples(phase).unwrap().windows(2) {
            if window[0].video_id == window[1].video_id {
                assert!(window[0].frame_number < window[1].frame_number);
            }
        }
    }
    Ok(())
}

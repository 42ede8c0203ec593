use anyhow::Context;
use capsule_dataset::{
    download, CapsuleDataset, Config, Metadata, PatientRatioSplit, SplitStrategy,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fetch",
    about = "Download the Kvasir-Capsule dataset and generate a patient-aware split"
)]
struct Args {
    /// Dataset root directory (defaults to the configured root).
    #[arg(long)]
    root: Option<PathBuf>,
    /// Skip the download step and use files already on disk.
    #[arg(long, default_value_t = false)]
    skip_download: bool,
    /// Re-download files even if they are already present.
    #[arg(long, default_value_t = false)]
    overwrite: bool,
    /// Where to write the generated split.
    #[arg(long, default_value = "split.json")]
    split_out: PathBuf,
    /// Patient ordering strategy.
    #[arg(long, value_parser = ["sort", "shuffle"], default_value = "sort")]
    strategy: String,
    /// Seed for the shuffle strategy (defaults to the configured seed).
    #[arg(long)]
    seed: Option<u64>,
    /// Training phase ratio.
    #[arg(long, default_value_t = 0.8)]
    train: f64,
    /// Validation phase ratio.
    #[arg(long, default_value_t = 0.1)]
    val: f64,
    /// Test phase ratio.
    #[arg(long, default_value_t = 0.1)]
    test: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let config = Config::load().context("failed to load configuration")?;
    let root = args.root.unwrap_or_else(|| config.dataset_root.clone());
    let seed = args.seed.unwrap_or(config.random_seed);

    if !args.skip_download {
        download::download_all(&root, args.overwrite).context("dataset download failed")?;
        CapsuleDataset::validate_layout(&root)
            .context("dataset incomplete after download/extraction")?;
    }

    let metadata = Metadata::load(&root).context("failed to load metadata.csv")?;
    println!(
        "{} samples across {} patients",
        metadata.num_samples(),
        metadata.num_patients()
    );

    let strategy = match args.strategy.as_str() {
        "shuffle" => SplitStrategy::Shuffle,
        _ => SplitStrategy::Sort,
    };
    let mut split =
        PatientRatioSplit::new([("train", args.train), ("val", args.val), ("test", args.test)])?;
    split.generate(&metadata, strategy, seed)?;
    split.save(&args.split_out)?;

    for (phase, ratio) in split.ratios() {
        let count = split.samples(phase).map(<[_]>::len).unwrap_or(0);
        println!("{phase} ({ratio}): {count} samples");
    }
    println!("split written to {}", args.split_out.display());
    Ok(())
}

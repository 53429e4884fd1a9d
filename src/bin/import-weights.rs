//! Converts a PyTorch `state_dict` into the artifact pair `guess-digit` loads.
//!
//! ```shell
//! cargo run --features pytorch --bin import-weights -- mnist_model_weights.pth --out . \
//!     --remap "^fc1\.(.+)$=linear1.$1" --remap "^fc2\.(.+)$=linear2.$1"
//! ```
//!
//! The network in the file must have the layout described by the default
//! [DigitClassifierConfig]; layer names that differ can be mapped with `--remap`.

use std::{env, path::PathBuf, process};

use burn::backend::NdArray;
use guess_digit::{
    loader::import_pytorch, ArtifactPaths, DigitClassifierConfig, LoadError, ModelArtifacts,
};

// Basic backend type (not used for computation).
type B = NdArray<f32>;

#[derive(Debug, PartialEq)]
struct Args {
    weights: PathBuf,
    out_dir: PathBuf,
    remaps: Vec<(String, String)>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Args> {
    let mut weights = None;
    let mut out_dir = PathBuf::from(".");
    let mut remaps = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out_dir = args.next()?.into(),
            "--remap" => {
                let remap = args.next()?;
                let (pattern, replacement) = remap.split_once('=')?;
                remaps.push((pattern.to_string(), replacement.to_string()));
            }
            _ if weights.is_none() && !arg.starts_with("--") => weights = Some(PathBuf::from(arg)),
            _ => return None,
        }
    }

    Some(Args {
        weights: weights?,
        out_dir,
        remaps,
    })
}

fn convert(args: &Args) -> Result<ArtifactPaths, LoadError> {
    let device = Default::default();
    let record = import_pytorch::<B>(&args.weights, &args.remaps, &device)?;

    let paths = ArtifactPaths::in_dir(&args.out_dir);

    // Refuse to write a pair the loader would reject.
    let classifier = ModelArtifacts {
        config: DigitClassifierConfig::new(),
        record,
    }
    .into_classifier(&paths, &device)?;

    ModelArtifacts::from_classifier(DigitClassifierConfig::new(), classifier).save(&paths)?;

    Ok(paths)
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "import-weights".to_string());

    let Some(args) = parse_args(argv) else {
        eprintln!("Usage: {program} <weights.pth> [--out <dir>] [--remap <pattern>=<replacement>]...");
        process::exit(1);
    };

    println!("Loading PyTorch weights from '{}'...", args.weights.display());
    match convert(&args) {
        Ok(paths) => println!(
            "Model saved to '{}' and '{}'.",
            paths.architecture.display(),
            paths.weights.display()
        ),
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

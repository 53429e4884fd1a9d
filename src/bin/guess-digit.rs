use std::{
    env,
    ffi::OsString,
    io::{self, Write},
    path::PathBuf,
    process,
};

use anyhow::{bail, Context, Result};
use guess_digit::{
    backend::{default_device, InferenceBackend},
    inference::Classifier,
    sketch::{self, Background},
    ArtifactPaths, Predictor,
};

const TITLE: &str = "Guess that digit";
const DESCRIPTION: &str = "Draw your favorite base-10 digit (0-9) and I'll try to guess what you drew! \
I do a bit better if you're not too messy and your digit is fairly centered.";

const ARTIFACTS_ENV: &str = "GUESS_DIGIT_ARTIFACTS";

#[derive(Debug)]
struct Args {
    artifacts: Option<PathBuf>,
    background: Background,
    images: Vec<PathBuf>,
}

fn usage(program: &str) -> String {
    format!("Usage: {program} [--artifacts <dir>] [--invert auto|always|never] <image>...")
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let program = args.next().unwrap_or_else(|| "guess-digit".to_string());
    let mut parsed = Args {
        artifacts: None,
        background: Background::Auto,
        images: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--artifacts" => {
                let dir = args.next().context("--artifacts needs a directory")?;
                parsed.artifacts = Some(dir.into());
            }
            "--invert" => {
                parsed.background = match args.next().as_deref() {
                    Some("auto") => Background::Auto,
                    Some("always") => Background::Light,
                    Some("never") => Background::Dark,
                    other => bail!("Unknown --invert value {other:?}\n{}", usage(&program)),
                };
            }
            "-h" | "--help" => {
                println!("{TITLE}\n\n{DESCRIPTION}\n\n{}", usage(&program));
                process::exit(0);
            }
            _ if arg.starts_with("--") => bail!("Unknown option {arg}\n{}", usage(&program)),
            _ => parsed.images.push(arg.into()),
        }
    }

    if parsed.images.is_empty() {
        bail!("No image given\n{}", usage(&program));
    }

    Ok(parsed)
}

/// The `--artifacts` flag wins over the environment; both fall back to the working directory.
fn artifact_paths(flag: Option<PathBuf>, env: Option<OsString>) -> ArtifactPaths {
    flag.or_else(|| env.map(PathBuf::from))
        .map(ArtifactPaths::in_dir)
        .unwrap_or_default()
}

/// Prints one `IMAGE: DIGIT` line per image and returns how many images failed.
fn classify_all<C, W>(
    predictor: &Predictor<InferenceBackend, C>,
    images: &[PathBuf],
    background: Background,
    out: &mut W,
) -> io::Result<usize>
where
    C: Classifier<InferenceBackend>,
    W: Write,
{
    let mut failures = 0;

    for image in images {
        let result = sketch::load_grid(image, predictor.input_shape(), background)
            .map_err(anyhow::Error::from)
            .and_then(|grid| Ok(predictor.predict(&grid)?));

        match result {
            Ok(digit) => writeln!(out, "{}: {digit}", image.display())?,
            Err(err) => {
                log::error!("{}: {err:#}", image.display());
                failures += 1;
            }
        }
    }

    Ok(failures)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(env::args())?;
    let paths = artifact_paths(args.artifacts, env::var_os(ARTIFACTS_ENV));

    println!("{TITLE}\n{DESCRIPTION}\n");

    let device = default_device();
    let predictor = Predictor::<InferenceBackend>::load(&paths, &device)
        .context("Cannot start without the model artifacts")?;

    let failures = classify_all(&predictor, &args.images, args.background, &mut io::stdout())?;
    if failures > 0 {
        bail!("{failures} of {} images could not be classified", args.images.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guess_digit::DigitClassifierConfig;
    use image::{GrayImage, Luma};

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_flags_and_images() {
        let parsed = args(&["guess-digit", "--artifacts", "models", "--invert", "never", "a.png", "b.png"])
            .unwrap();

        assert_eq!(parsed.artifacts, Some(PathBuf::from("models")));
        assert_eq!(parsed.background, Background::Dark);
        assert_eq!(parsed.images, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    }

    #[test]
    fn unknown_invert_value_is_rejected() {
        let err = args(&["guess-digit", "--invert", "sometimes", "a.png"]).unwrap_err();

        assert!(err.to_string().contains("Unknown --invert value"), "{err}");
    }

    #[test]
    fn images_are_required() {
        assert!(args(&["guess-digit", "--artifacts", "models"]).is_err());
        assert!(args(&["guess-digit", "--artifacts"]).is_err());
    }

    #[test]
    fn flag_wins_over_environment() {
        let paths = artifact_paths(Some("flag".into()), Some("env".into()));

        assert_eq!(paths, ArtifactPaths::in_dir("flag"));
    }

    #[test]
    fn environment_is_used_without_flag() {
        assert_eq!(artifact_paths(None, Some("env".into())), ArtifactPaths::in_dir("env"));
        assert_eq!(artifact_paths(None, None), ArtifactPaths::default());
    }

    #[test]
    fn failed_image_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let classifier = DigitClassifierConfig::new()
            .with_hidden_size(16)
            .init::<InferenceBackend>(&device);
        let predictor: Predictor<InferenceBackend> = Predictor::new(classifier);

        let drawing = GrayImage::from_fn(28, 28, |x, _| Luma([if x == 14 { 0 } else { 255 }]));
        let first = dir.path().join("first.png");
        let last = dir.path().join("last.png");
        drawing.save(&first).unwrap();
        drawing.save(&last).unwrap();
        let images = vec![first, dir.path().join("missing.png"), last];

        let mut out = Vec::new();
        let failures = classify_all(&predictor, &images, Background::Auto, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(failures, 1);
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains("first.png: "));
        assert!(out.contains("last.png: "));
        assert!(!out.contains("missing.png"));
    }
}

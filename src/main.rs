use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use memories::export::{export_drafts, ExportFormat};
use memories::{logging, Config, Media, Pipeline, PipelineUpdate};

#[derive(Debug, Default)]
struct Args {
    media: Option<PathBuf>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("memories {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--media" | "-m" => &mut parsed.media,
            "--config" | "-c" => &mut parsed.config,
            "--output" | "-o" => &mut parsed.output,
            "--csv" => &mut parsed.csv,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        };

        if i + 1 < args.len() {
            *slot = Some(PathBuf::from(&args[i + 1]));
            i += 1;
        } else {
            eprintln!("Error: {} requires a path argument", args[i]);
            std::process::exit(1);
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"memories - detect vacations in a photo library and curate their best media

USAGE:
    memories --media FILE [OPTIONS]

OPTIONS:
    --media, -m FILE    JSON array of enriched media records
    --config, -c PATH   Path to config file
    --output, -o FILE   Write drafts as JSON (default: stdout)
    --csv FILE          Also write a CSV summary of the drafts
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEMORIES_CONFIG     Path to config file (overrides default location)
    MEMORIES_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/memories/config.toml"#
    );
}

fn load_media(path: &Path) -> Result<Vec<Media>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read media file {}", path.display()))?;
    let media: Vec<Media> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse media file {}", path.display()))?;
    Ok(media)
}

fn report(update: &PipelineUpdate) {
    match update {
        PipelineUpdate::Started { media } => eprintln!("Loaded {} media", media),
        PipelineUpdate::HomeResolved {
            latitude,
            longitude,
        } => eprintln!("Home at {:.4}, {:.4}", latitude, longitude),
        PipelineUpdate::DaysSummarized { days, away } => {
            eprintln!("Summarized {} days ({} away)", days, away)
        }
        PipelineUpdate::RunsDetected { runs } => eprintln!("Found {} candidate runs", runs),
        PipelineUpdate::RunScored {
            current,
            total,
            start,
            end,
            accepted,
        } => eprintln!(
            "[{}/{}] {} .. {} {}",
            current,
            total,
            start,
            end,
            if *accepted { "accepted" } else { "rejected" }
        ),
        PipelineUpdate::Completed { drafts } => eprintln!("Built {} drafts", drafts),
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let Some(media_path) = args.media else {
        print_help();
        bail!("--media is required");
    };

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {:#}", e);
    }
    let media = load_media(&media_path)?;

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || Pipeline::new(config).run(&media, Some(tx)));

    for update in rx {
        report(&update);
    }

    let result = match worker.join() {
        Ok(result) => result?,
        Err(_) => bail!("Pipeline thread panicked"),
    };

    match &args.output {
        Some(path) => {
            let count = export_drafts(&result.drafts, path, ExportFormat::from_path(path))?;
            eprintln!("Wrote {} drafts to {}", count, path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&result.drafts)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    if let Some(path) = &args.csv {
        let count = export_drafts(&result.drafts, path, ExportFormat::Csv)?;
        eprintln!("Wrote {} draft summaries to {}", count, path.display());
    }

    Ok(())
}

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use video_ingest_rust::processing::parse_qualities;
use video_ingest_rust::{
    AudioExtractor, CancellationToken, Config, FfmpegEngine, JobRequest, MediaEngine,
    MetadataProber, PipelineCoordinator, ProfileTable, QualityPolicy, SourceFile, ThumbnailPlan,
    Validator,
};

fn input_arg() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .value_name("FILE")
        .help("Source video file")
        .required(true)
}

fn cli() -> Command {
    Command::new("Video Ingest (Rust)")
        .version("0.1.0")
        .about("Probe, validate, thumbnail and transcode uploaded videos")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("process")
                .about("Run the full ingestion pipeline for one source")
                .arg(input_arg())
                .arg(
                    Arg::new("video-dir")
                        .long("video-dir")
                        .value_name("DIR")
                        .help("Directory for quality variants"),
                )
                .arg(
                    Arg::new("thumbnail-dir")
                        .long("thumbnail-dir")
                        .value_name("DIR")
                        .help("Directory for thumbnails"),
                )
                .arg(
                    Arg::new("quality")
                        .short('q')
                        .long("quality")
                        .value_name("QUALITY")
                        .help("Quality variant to produce (240p, 360p, 480p, 720p, 1080p)")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("thumbnails")
                        .long("thumbnails")
                        .value_name("COUNT")
                        .help("Capture COUNT evenly spaced thumbnails")
                        .value_parser(clap::value_parser!(usize))
                        .conflicts_with_all(["thumbnail-at", "thumbnail", "no-thumbnail"]),
                )
                .arg(
                    Arg::new("thumbnail-at")
                        .long("thumbnail-at")
                        .value_name("SECS")
                        .help("Capture one thumbnail at this offset")
                        .value_parser(clap::value_parser!(u64))
                        .conflicts_with_all(["thumbnail", "no-thumbnail"]),
                )
                .arg(
                    Arg::new("thumbnail")
                        .long("thumbnail")
                        .value_name("FILE")
                        .help("Use an existing thumbnail instead of capturing one")
                        .conflicts_with("no-thumbnail"),
                )
                .arg(
                    Arg::new("no-thumbnail")
                        .long("no-thumbnail")
                        .help("Skip thumbnail capture")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("NUM")
                        .help("Number of parallel workers")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .value_name("POLICY")
                        .help("best-effort, require-any or require-all"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .help("Cancel the job after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_name("FILE")
                        .help("Also write the result as JSON to this file"),
                ),
        )
        .subcommand(
            Command::new("probe")
                .about("Print source metadata as JSON")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Probe and validate a source")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("extract-audio")
                .about("Extract the audio track of a source")
                .arg(input_arg())
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Output directory for the audio file"),
                ),
        )
        .subcommand(Command::new("profiles").about("List the quality profiles"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("video_ingest_rust={},warn", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn input_path(matches: &ArgMatches) -> Result<PathBuf> {
    matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--input is required"))
}

/// Cancel `cancel` on Ctrl-C or once `timeout` elapses
fn spawn_cancel_watcher(
    cancel: CancellationToken,
    timeout: Option<u64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interrupted = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let timed_out = async {
            match timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = interrupted => warn!("🛑 Interrupt received, cancelling job"),
            _ = timed_out => warn!("⏰ Job timed out, cancelling"),
        }
        cancel.cancel();
    })
}

async fn run_process(
    matches: &ArgMatches,
    config: &Config,
    engine: Arc<dyn MediaEngine>,
) -> Result<()> {
    let source = SourceFile::stage(input_path(matches)?).await?;
    let mut request = JobRequest::from_config(source, config)?;

    if let Some(dir) = matches.get_one::<String>("video-dir") {
        request.video_dir = PathBuf::from(dir);
    }
    if let Some(dir) = matches.get_one::<String>("thumbnail-dir") {
        request.thumbnail_dir = PathBuf::from(dir);
    }
    if let Some(names) = matches.get_many::<String>("quality") {
        request.qualities = parse_qualities(names.map(String::as_str))?;
    }

    if matches.get_flag("no-thumbnail") {
        request.thumbnails = ThumbnailPlan::None;
    } else if let Some(path) = matches.get_one::<String>("thumbnail") {
        request.thumbnails = ThumbnailPlan::Supplied(PathBuf::from(path));
    } else if let Some(offset) = matches.get_one::<u64>("thumbnail-at") {
        request.thumbnails = ThumbnailPlan::Single { offset: *offset };
    } else if let Some(count) = matches.get_one::<usize>("thumbnails") {
        request.thumbnails = ThumbnailPlan::Evenly { count: *count };
    }

    let mut coordinator = PipelineCoordinator::new(config, engine);
    if let Some(workers) = matches.get_one::<usize>("workers") {
        if *workers == 0 {
            return Err(anyhow!("--workers must be greater than 0"));
        }
        coordinator = coordinator.with_max_workers(*workers);
    }
    if let Some(policy) = matches.get_one::<String>("policy") {
        let policy: QualityPolicy = policy.parse().map_err(|e: String| anyhow!(e))?;
        coordinator = coordinator.with_quality_policy(policy);
    }

    let timeout = matches
        .get_one::<u64>("timeout")
        .copied()
        .or(config.performance.job_timeout_secs);
    let report = matches
        .get_one::<String>("report")
        .map(PathBuf::from)
        .or_else(|| config.output.report_file.clone());

    info!("📁 Source: {}", request.source.path().display());
    info!("📂 Videos: {}", request.video_dir.display());
    info!("🖼️ Thumbnails: {}", request.thumbnail_dir.display());

    let cancel = CancellationToken::new();
    let watcher = spawn_cancel_watcher(cancel.clone(), timeout);
    let outcome = coordinator.process_with_cancel(request, &cancel).await;
    watcher.abort();

    match outcome {
        Ok(result) => {
            if let Some(path) = report {
                result.save_report(&path).await?;
            }
            info!(
                "✅ Successful qualities: {:?}, ❌ failed: {:?}",
                result.successful_qualities(),
                result.failed_qualities()
            );
            print_json(&result)
        }
        Err(e) => {
            error!("Job failed at {} stage: {}", e.stage(), e);
            Err(anyhow!(e))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_default(),
    };
    if matches.get_flag("verbose") {
        config.output.log_level = "debug".to_string();
    }

    init_logging(&config.output.log_level);
    config.validate().context("Invalid configuration")?;
    debug!("{}", config.summary());

    let engine: Arc<dyn MediaEngine> = Arc::new(FfmpegEngine::new(&config.engine));

    match matches.subcommand() {
        Some(("process", sub)) => run_process(sub, &config, engine).await?,
        Some(("probe", sub)) => {
            let prober = MetadataProber::new(engine);
            let metadata = prober.probe(&input_path(sub)?).await?;
            print_json(&metadata)?;
        }
        Some(("validate", sub)) => {
            let prober = MetadataProber::new(engine);
            let validator = Validator::new((&config.validation).into());
            let verdict = validator.validate_source(&prober, &input_path(sub)?).await;
            print_json(&verdict)?;
            if !verdict.is_valid {
                std::process::exit(1);
            }
        }
        Some(("extract-audio", sub)) => {
            let output_dir = sub
                .get_one::<String>("output-dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| config.output.audio_dir.clone());
            let extractor = AudioExtractor::new(engine, &config.audio);

            let cancel = CancellationToken::new();
            let watcher = spawn_cancel_watcher(cancel.clone(), config.performance.job_timeout_secs);
            let outcome = extractor.extract(&input_path(sub)?, &output_dir, &cancel).await;
            watcher.abort();

            let audio_path = outcome?;
            println!("{}", audio_path.display());
        }
        Some(("profiles", _)) => {
            let profiles: Vec<_> = ProfileTable::standard().iter().copied().collect();
            print_json(&profiles)?;
        }
        _ => return Err(anyhow!("Unknown command")),
    }

    Ok(())
}

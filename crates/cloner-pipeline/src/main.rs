//! `cloner` binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use cloner_models::{
    AspectRatio, GenerationModel, JobKind, JobStatus, ProjectName, Resolution, VideoLength,
    DEFAULT_PROJECT_NAME,
};
use cloner_pipeline::{
    dispatcher_from_env, init_tracing, poll_job, verify, AnalyzeOptions, ApprovalGate,
    AutoApprove, CombineOptions, ConsoleApproval, ImageOptions, LogOptions, PipelineConfig,
    PipelineError, ProjectContext, PromptOptions, Sequencer, Services, Stage, StageOptions,
    StageOutcome, VideoOptions,
};

/// Exit code for a run stopped with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "cloner", version)]
#[command(about = "Recreate a reference video's structure with new generated scenes", long_about = None)]
struct Cli {
    /// Record-store partition for this project
    #[arg(long, global = true, env = "CLONER_PROJECT_NAME", default_value = DEFAULT_PROJECT_NAME)]
    project_name: String,

    /// Print the plan and cost estimate without paid calls or writes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Approve spend without asking
    #[arg(short = 'y', long, global = true, alias = "skip-approval")]
    yes: bool,

    /// Cheapest model, first pending scene only
    #[arg(long, global = true)]
    test_mode: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze the source video into scenes
    Analyze {
        /// Source video to clone
        #[arg(short, long)]
        video: PathBuf,
    },

    /// Turn the analysis into image and video prompts
    Prompts(PromptArgs),

    /// Log the prompts as scene records
    Log {
        /// Delete the project's existing records first
        #[arg(long)]
        clear: bool,
    },

    /// Generate the start image for every scene
    Images(ImageArgs),

    /// Generate a video from every scene's start image
    Videos(VideoArgs),

    /// Join the scene videos into the final video
    Combine(CombineArgs),

    /// Run a range of stages, skipping the ones already done
    Run(RunArgs),

    /// Wait for a job submitted by an earlier run
    Poll {
        /// image or video
        #[arg(short, long)]
        kind: JobKind,

        /// Vendor job id
        job_id: String,
    },

    /// Check API keys, FFmpeg and the work directory
    Verify,
}

#[derive(Args, Clone, Default)]
struct PromptArgs {
    /// Product or character image (auto-detected from the inputs directory)
    #[arg(short, long)]
    reference_image: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct ImageArgs {
    /// z-image or nano-banana-pro
    #[arg(short, long, default_value = "z-image")]
    model: GenerationModel,

    /// Reference image for models that accept one
    #[arg(short, long)]
    reference_image: Option<PathBuf>,

    /// 1:1, 16:9 or 9:16 (model default when unset)
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,

    /// 1K, 2K or 4K
    #[arg(long, default_value = "1K")]
    resolution: Resolution,
}

#[derive(Args, Clone)]
struct VideoArgs {
    #[arg(short, long, default_value = "sora-2")]
    model: GenerationModel,

    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,

    /// Clip length in seconds (10 or 15)
    #[arg(long, default_value = "10")]
    duration: VideoLength,

    #[arg(long)]
    keep_watermark: bool,

    /// Record the video URL without downloading the file
    #[arg(long)]
    skip_download: bool,
}

#[derive(Args, Clone)]
struct CombineArgs {
    /// Final video path (defaults to final_video.mp4 in the project directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Background music laid under the combined video
    #[arg(long)]
    music: Option<PathBuf>,

    /// Music fade-out in seconds
    #[arg(long, default_value_t = 2.0)]
    fade_duration: f64,

    /// Re-encode instead of stream copy (for clips with mismatched codecs)
    #[arg(long)]
    re_encode: bool,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Source video, needed when the analyze stage runs
    #[arg(short, long)]
    video: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "analyze")]
    from: Stage,

    #[arg(long, value_enum, default_value = "combine")]
    to: Stage,

    #[arg(short, long)]
    reference_image: Option<PathBuf>,

    /// Re-log the records even when some exist
    #[arg(long)]
    clear: bool,

    #[arg(long, default_value = "z-image")]
    image_model: GenerationModel,

    #[arg(long, default_value = "1K")]
    resolution: Resolution,

    #[arg(long, default_value = "sora-2")]
    video_model: GenerationModel,

    #[arg(long, default_value = "10")]
    duration: VideoLength,

    #[arg(long)]
    keep_watermark: bool,

    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    music: Option<PathBuf>,

    #[arg(long, default_value_t = 2.0)]
    fade_duration: f64,

    #[arg(long)]
    re_encode: bool,
}

impl From<ImageArgs> for ImageOptions {
    fn from(args: ImageArgs) -> Self {
        Self {
            model: args.model,
            reference_image: args.reference_image,
            aspect_ratio: args.aspect_ratio,
            resolution: args.resolution,
        }
    }
}

impl From<VideoArgs> for VideoOptions {
    fn from(args: VideoArgs) -> Self {
        Self {
            model: args.model,
            aspect_ratio: args.aspect_ratio,
            length: args.duration,
            remove_watermark: !args.keep_watermark,
            skip_download: args.skip_download,
        }
    }
}

impl From<CombineArgs> for CombineOptions {
    fn from(args: CombineArgs) -> Self {
        Self {
            output: args.output,
            music: args.music,
            fade_duration: args.fade_duration,
            re_encode: args.re_encode,
        }
    }
}

impl From<RunArgs> for StageOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            analyze: AnalyzeOptions { video: args.video },
            prompts: PromptOptions {
                reference_image: args.reference_image.clone(),
            },
            log: LogOptions { clear: args.clear },
            images: ImageOptions {
                model: args.image_model,
                reference_image: args.reference_image,
                aspect_ratio: None,
                resolution: args.resolution,
            },
            videos: VideoOptions {
                model: args.video_model,
                length: args.duration,
                remove_watermark: !args.keep_watermark,
                ..VideoOptions::default()
            },
            combine: CombineOptions {
                output: args.output,
                music: args.music,
                fade_duration: args.fade_duration,
                re_encode: args.re_encode,
            },
        }
    }
}

impl Command {
    /// Stage range this command runs, if it runs stages at all.
    fn stages(&self) -> Option<(Stage, Stage)> {
        let single = |s| Some((s, s));
        match self {
            Command::Analyze { .. } => single(Stage::Analyze),
            Command::Prompts(_) => single(Stage::Prompts),
            Command::Log { .. } => single(Stage::Log),
            Command::Images(_) => single(Stage::Images),
            Command::Videos(_) => single(Stage::Videos),
            Command::Combine(_) => single(Stage::Combine),
            Command::Run(args) => Some((args.from, args.to)),
            Command::Poll { .. } | Command::Verify => None,
        }
    }

    fn into_options(self) -> StageOptions {
        let mut options = StageOptions::default();
        match self {
            Command::Analyze { video } => options.analyze.video = Some(video),
            Command::Prompts(args) => options.prompts.reference_image = args.reference_image,
            Command::Log { clear } => options.log.clear = clear,
            Command::Images(args) => options.images = args.into(),
            Command::Videos(args) => options.videos = args.into(),
            Command::Combine(args) => options.combine = args.into(),
            Command::Run(args) => options = args.into(),
            Command::Poll { .. } | Command::Verify => {}
        }
        options
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    dotenvy::from_path(".agent/.env").ok();

    let cli = Cli::parse();
    init_tracing();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, stopping after the current step (Ctrl-C again to quit now)");
        let _ = cancel_tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(i32::from(EXIT_CANCELLED));
        }
    });

    match execute(cli, cancel_rx).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

async fn execute(cli: Cli, cancel: watch::Receiver<bool>) -> anyhow::Result<ExitCode> {
    let config = PipelineConfig::from_env();

    let Some((from, to)) = cli.command.stages() else {
        return match cli.command {
            Command::Poll { kind, job_id } => poll(&config, kind, &job_id, cancel).await,
            _ => run_verify(&config).await,
        };
    };

    let project = ProjectName::new(&cli.project_name).map_err(PipelineError::from)?;
    let ctx = ProjectContext::new(project, &config)
        .with_dry_run(cli.dry_run)
        .with_test_mode(cli.test_mode);
    info!(
        project = %ctx.project(),
        dry_run = ctx.dry_run(),
        test_mode = ctx.test_mode(),
        "Starting cloner"
    );

    let approval: Arc<dyn ApprovalGate> = if cli.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(ConsoleApproval)
    };
    let stages: Vec<Stage> = Stage::range(from, to).collect();
    let services = Services::from_env(&config, &stages, cli.dry_run, approval, cancel)?;

    let is_run = matches!(cli.command, Command::Run(_));
    let options = cli.command.into_options();
    let sequencer = Sequencer::new(&ctx, &services, &options);

    let outcomes = if is_run {
        sequencer.run(from, to).await?.outcomes
    } else {
        vec![(from, sequencer.run_stage(from).await?)]
    };

    for (stage, outcome) in &outcomes {
        println!("{stage}: {outcome}");
    }
    if outcomes
        .iter()
        .any(|(_, o)| matches!(o, StageOutcome::Declined))
    {
        println!("Spend declined, nothing was submitted.");
    }
    Ok(ExitCode::SUCCESS)
}

async fn poll(
    config: &PipelineConfig,
    kind: JobKind,
    job_id: &str,
    cancel: watch::Receiver<bool>,
) -> anyhow::Result<ExitCode> {
    let dispatcher = dispatcher_from_env(config, cancel)?;
    let job = poll_job(&dispatcher, kind, job_id).await?;

    println!("{} job {}: {}", job.kind, job.job_id, job.status());
    match job.status() {
        JobStatus::Completed => {
            if let Some(url) = job.result_reference() {
                println!("result: {url}");
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            if let Some(detail) = job.error_detail() {
                println!("detail: {detail}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_verify(config: &PipelineConfig) -> anyhow::Result<ExitCode> {
    let results = verify(config).await;
    for result in &results {
        println!("{result}");
    }
    if results.iter().all(|r| r.ok) {
        println!("Setup looks good.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Fix the failed checks above before running the pipeline.");
        Ok(ExitCode::FAILURE)
    }
}

fn report_error(e: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {e:#}");

    let Some(pipeline_error) = e.downcast_ref::<PipelineError>() else {
        return ExitCode::FAILURE;
    };
    if let Some(stage) = pipeline_error.stage() {
        eprintln!("  stage: {stage}");
    }
    eprintln!("  kind:  {}", pipeline_error.kind());

    let job_ids = pipeline_error.job_ids();
    if !job_ids.is_empty() {
        let ids: Vec<String> = job_ids.iter().map(ToString::to_string).collect();
        eprintln!("  jobs:  {}", ids.join(", "));
        eprintln!("  re-check with: cloner poll --kind <image|video> <job id>");
    }

    if pipeline_error.is_cancelled() {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::FAILURE
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scribe_pipeline::config::{Execution, PipelineConfig};
use scribe_pipeline::kernel::backoff::BackoffPolicy;
use scribe_pipeline::services::transcription::{HttpTranscriber, HttpTranscriberConfig, TranscriptionOptions};
use scribe_pipeline::RecordingTranscriber;

#[derive(Parser, Debug)]
#[command(name = "scribe-pipeline")]
#[command(about = "Transcribe a long recording through a size-limited speech-to-text API", long_about = None)]
struct Args {
    /// Audio file to transcribe
    input: PathBuf,

    /// Write the transcript here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the full result (segments, errors, durations) as JSON
    #[arg(long)]
    json: bool,

    /// Exit non-zero if any segment failed
    #[arg(long)]
    strict: bool,

    /// Transcription server base URL
    #[arg(long, env = "TRANSCRIBE_BASE_URL", default_value = "https://api.openai.com")]
    base_url: String,

    #[arg(long, env = "TRANSCRIBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "TRANSCRIBE_MODEL", default_value = "whisper-1")]
    model: String,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    prompt: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum segment size in MiB
    #[arg(long, env = "MAX_SEGMENT_MIB", default_value = "25")]
    max_segment_mib: usize,

    /// Process segments one at a time instead of through the job queue
    #[arg(long)]
    sequential: bool,

    #[arg(long, env = "MAX_CONCURRENT", default_value = "2")]
    max_concurrent: usize,

    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    #[arg(long, env = "RETRY_DELAY_MS", default_value = "1000")]
    retry_delay_ms: u64,

    /// Use capped exponential backoff with this ceiling (ms) instead of linear
    #[arg(long)]
    max_backoff_ms: Option<u64>,

    /// Per-attempt timeout in seconds; unset means no limit
    #[arg(long, env = "JOB_TIMEOUT_SECS")]
    job_timeout_secs: Option<u64>,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_segment_size: self.max_segment_mib * 1024 * 1024,
            execution: if self.sequential {
                Execution::Sequential
            } else {
                Execution::Concurrent
            },
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_delay_ms,
            backoff: match self.max_backoff_ms {
                Some(max_delay_ms) => BackoffPolicy::Exponential { max_delay_ms },
                None => BackoffPolicy::Linear,
            },
            job_timeout_secs: self.job_timeout_secs,
            ..PipelineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let args = Args::parse();
    let config = args.pipeline_config();

    let payload = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;
    tracing::info!("Loaded {} ({} bytes)", args.input.display(), payload.len());

    let transcriber = Arc::new(HttpTranscriber::new(HttpTranscriberConfig {
        base_url: args.base_url.clone(),
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        request_timeout: args.job_timeout_secs.map(Duration::from_secs),
    }));

    let options = TranscriptionOptions {
        language: args.language.clone(),
        prompt: args.prompt.clone(),
        temperature: args.temperature,
    };

    let result = RecordingTranscriber::new(&config, transcriber)?
        .with_options(options)
        .process(&payload)
        .await?;

    let rendered = if args.json {
        serde_json::to_string_pretty(&result)?
    } else {
        result.combined_transcript.clone()
    };

    match &args.output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{}", rendered),
    }

    for error in &result.errors {
        eprintln!("{}", error);
    }
    tracing::info!(
        "Done: {} segment(s), {:.1}s of audio, {} error(s)",
        result.segments.len(),
        result.total_duration,
        result.errors.len()
    );

    if args.strict && !result.errors.is_empty() {
        bail!("{} segment(s) failed", result.errors.len());
    }
    Ok(())
}

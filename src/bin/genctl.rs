use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use text2video_backend::generation::GenerationOutcome;
use text2video_backend::{Config, GenerationRequest, GeneratorKind, UsageCounters};

#[derive(Parser, Debug)]
#[command(name = "genctl", about = "CLI for the text2video generation backend", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrite a prompt through the local language model
    Enhance {
        text: String,
    },
    /// Generate an image
    Image {
        text: String,
        /// Use only this generator (comfyui, web, external)
        #[arg(long)]
        generator: Option<GeneratorKind>,
        /// Send the prompt as written
        #[arg(long)]
        no_enhance: bool,
    },
    /// Generate a video
    Video {
        text: String,
        /// Clip length in seconds
        #[arg(long)]
        duration: Option<u32>,
        /// Use only this generator (comfyui, web, external)
        #[arg(long)]
        generator: Option<GeneratorKind>,
        /// Send the prompt as written
        #[arg(long)]
        no_enhance: bool,
    },
    /// Print usage statistics
    Stats {
        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
        /// Clear all counters after printing them
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // Load env and parse CLI
    Config::dotenv_load();
    let cli = Cli::parse();

    let mut conf = Config::new().expect("Failed to load config");
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }
    let usage = UsageCounters::open(&conf.usage_db_path)?;

    match cli.command {
        Commands::Enhance { text } => {
            let orchestrator = conf.orchestrator(usage);
            let prompt = orchestrator.enhance_only(&text, true).await?;
            if !prompt.was_enhanced {
                eprintln!("Enhancer unavailable, prompt left unchanged");
            }
            println!("{}", prompt.enhanced_text);
        }
        Commands::Image { text, generator, no_enhance } => {
            let mut request = GenerationRequest::image(text).with_enhance(!no_enhance);
            if let Some(g) = generator {
                request = request.pinned_to(g);
            }
            let orchestrator = conf.orchestrator(usage);
            let result = orchestrator.generate(request).await;
            orchestrator.shutdown().await;
            report(result?);
        }
        Commands::Video { text, duration, generator, no_enhance } => {
            let mut request = GenerationRequest::video(text, duration).with_enhance(!no_enhance);
            if let Some(g) = generator {
                request = request.pinned_to(g);
            }
            let orchestrator = conf.orchestrator(usage);
            let result = orchestrator.generate(request).await;
            orchestrator.shutdown().await;
            report(result?);
        }
        Commands::Stats { pretty, reset } => {
            let stats = usage.stats()?;
            if pretty {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", serde_json::to_string(&stats)?);
            }
            if reset {
                usage.reset()?;
                eprintln!("Usage counters cleared");
            }
        }
    }
    Ok(())
}

fn report(outcome: GenerationOutcome) {
    for failure in &outcome.failed_attempts {
        eprintln!("{} failed ({}): {}", failure.generator, failure.kind, failure.message);
    }
    if outcome.prompt.was_enhanced {
        eprintln!("Enhanced prompt: {}", outcome.prompt.enhanced_text);
    }
    eprintln!("Generated by {}", outcome.artifact.source_generator);
    match outcome.artifact.data.url() {
        Some(url) => println!("{}", url),
        None => match serde_json::to_string(&outcome.artifact.data) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: {}", e),
        },
    }
}

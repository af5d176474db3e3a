use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wordfield::layout::{layout, stress};
use wordfield::matrix::DistanceMatrix;
use wordfield::provider::{CompletionProvider, HttpProvider, HttpProviderConfig, OfflineProvider};
use wordfield::topology::TopologySummary;
use wordfield::{AssemblyController, Phase, WordfieldConfig};

mod cli;
mod server;

use cli::{Cli, Commands, ProviderArgs, ProviderKind};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "wordfield=debug"
    } else {
        "wordfield=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> anyhow::Result<WordfieldConfig> {
    let mut config = WordfieldConfig::load_or_default(path).context("failed to load config")?;
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

fn build_provider(args: &ProviderArgs) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match args.provider {
        ProviderKind::Offline => Ok(Arc::new(OfflineProvider)),
        ProviderKind::Http => {
            let mut config = HttpProviderConfig::default();
            if let Some(url) = args
                .api_url
                .clone()
                .or_else(|| std::env::var("WORDFIELD_API_URL").ok())
            {
                config.url = url;
            }
            if let Some(model) = args
                .model
                .clone()
                .or_else(|| std::env::var("WORDFIELD_MODEL").ok())
            {
                config.model = model;
            }
            config.api_key = std::env::var("WORDFIELD_API_KEY").ok();
            if config.api_key.is_none() {
                warn!("WORDFIELD_API_KEY is not set, sending unauthenticated requests");
            }
            Ok(Arc::new(HttpProvider::new(config)?))
        }
    }
}

#[derive(Serialize)]
struct LayoutReport {
    positions: Vec<[f32; 3]>,
    stress: f32,
}

fn run_layout(matrix_path: &Path, config: &WordfieldConfig) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(matrix_path)
        .with_context(|| format!("failed to read {}", matrix_path.display()))?;
    let matrix: DistanceMatrix = serde_json::from_str(&text)
        .with_context(|| format!("invalid distance matrix in {}", matrix_path.display()))?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let positions = layout(&matrix, &config.layout, &mut rng);
    let report = LayoutReport {
        stress: stress(&matrix, &positions, config.layout.scale_factor),
        positions: positions.iter().map(|p| p.to_array()).collect(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct SimulationReport {
    question: String,
    phase: Phase,
    words: Vec<String>,
    summary: Option<TopologySummary>,
    explanation: Option<String>,
}

fn run_simulation(
    config: WordfieldConfig,
    question: &str,
    provider: &dyn CompletionProvider,
    seconds: f32,
    fps: u32,
) -> anyhow::Result<()> {
    let mut controller = AssemblyController::new(config);
    controller
        .submit_question(question, provider)
        .context("assembly aborted")?;
    let words = controller
        .space()
        .map(|space| space.words.clone())
        .unwrap_or_default();
    info!(words = words.len(), "space ready");

    let fps = fps.max(1);
    let dt = 1.0 / fps as f32;
    let frames = (seconds.max(0.0) * fps as f32).ceil() as usize;
    for _ in 0..frames {
        controller.tick(dt);
        controller.explain_with(provider);
        for event in controller.drain_events() {
            info!(stage = ?event.stage, "{}", event.message);
        }
        if controller.phase() == Phase::Observed && controller.explanation().is_some() {
            break;
        }
    }

    let report = SimulationReport {
        question: question.to_string(),
        phase: controller.phase(),
        words,
        summary: controller.summary().copied(),
        explanation: controller.explanation().map(str::to_string),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref(), cli.seed)?;

    match cli.command {
        Commands::Layout { matrix } => run_layout(&matrix, &config)?,
        Commands::Simulate {
            question,
            provider,
            seconds,
            fps,
        } => {
            let provider = build_provider(&provider)?;
            run_simulation(config, &question, provider.as_ref(), seconds, fps)?;
        }
        Commands::Serve {
            port,
            static_dir,
            provider,
            fps,
        } => {
            // The blocking HTTP client must be created and dropped outside the runtime
            let provider = build_provider(&provider)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(
                config,
                provider.clone(),
                server::ServeOptions {
                    port,
                    static_dir,
                    fps,
                },
            ))?;
            drop(runtime);
        }
    }

    Ok(())
}

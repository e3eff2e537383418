mod pose;
mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dynundo_history::config::resolve_data_dir;
use dynundo_history::{RedbStore, StackStore, UndoConfig};

use crate::script::{Scene, Step};

/// Bodies the demo scene registers, in registration order.
const BODIES: [&str; 2] = ["left", "right"];

/// Replays a script of edits, undos and redos against an animated scene.
///
/// Steps: `move:<body>:<x>,<y>,<z>`, `turn:<body>:<degrees>`,
/// `scale:<body>:<factor>`, `push:<body>`, `undo`, `redo`, `tick:<frames>`,
/// `save`. Bodies are `left` and `right`.
#[derive(Parser, Debug)]
#[command(name = "dynundo", version, about)]
struct Cli {
    /// Script steps, run in order.
    steps: Vec<String>,

    /// Directory holding the undo database.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Undo config file (created with defaults if missing).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames per second used by `tick` steps.
    #[arg(long, default_value_t = 60)]
    fps: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting dynundo");

    // Parse the whole script up front so a typo doesn't leave a half-run scene
    let steps = cli
        .steps
        .iter()
        .map(|s| s.parse::<Step>())
        .collect::<Result<Vec<_>>>()?;

    let data_dir = cli.data_dir.unwrap_or_else(resolve_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    let config_path = cli.config.unwrap_or_else(|| data_dir.join("undo.json"));
    let config = UndoConfig::load_or_create(&config_path);

    let store: Arc<dyn StackStore> = RedbStore::open(&data_dir)?;
    let mut scene = Scene::open(&BODIES, &config, Some(store), cli.fps)?;

    for step in &steps {
        tracing::debug!("Running {step:?}");
        scene.run(step)?;
    }

    let coordinator = scene.coordinator();
    tracing::info!(
        "Finished script: {} recorded actions, cursor at {}",
        coordinator.len(),
        coordinator.cursor()
    );

    for body in scene.bodies() {
        let pose = <pose::Pose as dynundo_history::UndoElement>::capture(body);
        println!("{}: {pose}", body.name);
    }

    Ok(())
}

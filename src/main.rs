use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use strategy_forge::engines::generation::{CancellationToken, StrategyGenerator};
use strategy_forge::{ConfigManager, EvolutionEngine, LogProgressCallback, SyntheticOracle, TemplateCodeGenerator};

/// Exit status after a second interrupt.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// First interrupt asks the engine to stop at the next generation
/// boundary. Returns `true` when a stop was already pending.
fn on_interrupt(token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return true;
    }
    warn!("Interrupt received, stopping after the current generation is checkpointed");
    token.cancel();
    false
}

fn main() -> Result<()> {
    env_logger::init();

    let manager = ConfigManager::new();
    if let Some(path) = std::env::args().nth(1) {
        manager
            .load_from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?;
        info!("Loaded configuration from {}", path);
    }
    let config = manager.get();

    let oracle = Arc::new(SyntheticOracle::new(config.evolution.seed.unwrap_or_default()));
    let generator: Option<Arc<dyn StrategyGenerator>> = config
        .evolution
        .code_generation
        .then(|| Arc::new(TemplateCodeGenerator::new()) as Arc<dyn StrategyGenerator>);

    let mut engine = EvolutionEngine::new(config, oracle, generator)?;
    let token = engine.cancellation_token();
    ctrlc::set_handler(move || {
        if on_interrupt(&token) {
            warn!("Second interrupt, exiting without waiting for the generation boundary");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
    .context("installing interrupt handler")?;

    let mut callback = LogProgressCallback;
    let summary = engine.run(&mut callback)?;

    if summary.cancelled {
        warn!("Run cancelled after generation {}", summary.final_generation);
    }
    info!(
        "Finished at generation {} ({} processed this run, {} cache hits, {} oracle calls, {} generator failures)",
        summary.final_generation,
        summary.generations_processed,
        summary.evaluator.cache_hits,
        summary.evaluator.oracle_calls,
        summary.generation_failures
    );

    match &summary.champion {
        Some(champion) => info!(
            "Champion {} ({}) promoted in generation {}",
            champion.genome_id,
            champion.template.name(),
            champion.generation
        ),
        None => info!("No champion was promoted"),
    }

    println!("{}", engine.snapshot().to_json()?);
    Ok(())
}

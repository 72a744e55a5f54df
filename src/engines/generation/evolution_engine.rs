use crate::config::AppConfig;
use crate::data::{Checkpoint, CheckpointStore};
use crate::engines::evaluation::{DataWindow, EvaluatorStats, FitnessEvaluator, ScoringOracle};
use crate::engines::generation::{
    champion::{ChampionRecord, ChampionTracker},
    crossover::{Crossover, Offspring},
    generator::{generate_with_timeout, CodeValidator, StrategyGenerator},
    genome::{EvaluationStatus, Individual},
    mutation::{AdaptiveMutation, Mutator},
    novelty::NoveltyAnalyzer,
    operators::Selector,
    pareto::{sorted_by_crowding, ParetoRanker},
    population::Population,
    progress::{GenerationSummary, ProgressCallback},
    snapshot::EvolutionSnapshot,
};
use crate::engines::metrics::{MultiObjectiveMetrics, ObjectiveConfig};
use crate::error::{ForgeError, Result};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Golden-ratio increment used to spread per-generation seeds.
const GENERATION_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Cooperative stop request, honoured at generation boundaries after the
/// checkpoint is written.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of [`EvolutionEngine::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Generations processed by this call.
    pub generations_processed: usize,
    pub final_generation: usize,
    pub cancelled: bool,
    pub resumed_from: Option<usize>,
    pub champion: Option<ChampionRecord>,
    pub evaluator: EvaluatorStats,
    pub generation_failures: usize,
}

/// Population manager: owns the population and drives one generation at a
/// time through evaluate, rank, annotate, champion, checkpoint and breed.
pub struct EvolutionEngine {
    config: AppConfig,
    objectives: Vec<ObjectiveConfig>,
    evaluator: FitnessEvaluator,
    generator: Option<Arc<dyn StrategyGenerator>>,
    code_validator: CodeValidator,
    ranker: ParetoRanker,
    novelty: NoveltyAnalyzer,
    selector: Selector,
    crossover: Crossover,
    mutator: Mutator,
    adaptive: AdaptiveMutation,
    champion: ChampionTracker,
    store: Option<CheckpointStore>,
    window: DataWindow,
    revalidation_window: DataWindow,
    population: Population,
    diversity: f64,
    /// Mutation rate the current population was bred with.
    bred_with_rate: Option<f64>,
    initialized: bool,
    /// The current population has been evaluated and ranked.
    processed: bool,
    resumed_from: Option<usize>,
    generation_failures: usize,
    cancel: CancellationToken,
}

impl EvolutionEngine {
    pub fn new(
        config: AppConfig,
        oracle: Arc<dyn ScoringOracle>,
        generator: Option<Arc<dyn StrategyGenerator>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.evolution.code_generation && generator.is_none() {
            return Err(ForgeError::Configuration(
                "Code generation is enabled but no generator was supplied".to_string(),
            ));
        }

        let objectives = config.objectives.clone();
        let evaluator = FitnessEvaluator::new(oracle, &config.evaluation, objectives.clone())?;
        let window = config.evaluation.window();
        let revalidation_window = config.evaluation.revalidation_window()?;

        let code_validator = CodeValidator::new(config.evolution.max_code_length);
        let generator_timeout = Some(Duration::from_millis(config.evolution.generator_timeout_ms));
        let crossover = match (&generator, config.evolution.hybridization) {
            (Some(g), true) => Crossover::with_hybridization(Arc::clone(g), code_validator.clone(), generator_timeout),
            _ => Crossover::parameters_only(),
        };

        let novelty = if config.novelty.include_template_baselines {
            NoveltyAnalyzer::new(config.novelty.weights)
        } else {
            NoveltyAnalyzer::without_baselines(config.novelty.weights)
        };

        let store = config
            .checkpoint
            .enabled
            .then(|| CheckpointStore::new(config.checkpoint.directory.clone()));

        Ok(Self {
            objectives: objectives.clone(),
            evaluator,
            generator,
            code_validator,
            ranker: ParetoRanker::new(objectives.clone()),
            novelty,
            selector: Selector::new(
                config.evolution.tournament_size,
                config.evolution.p_diversity,
                objectives.clone(),
            ),
            crossover,
            mutator: Mutator::new(config.evolution.mutation.sigma_scale),
            adaptive: AdaptiveMutation::new(config.evolution.mutation.clone()),
            champion: ChampionTracker::new(config.champion.clone(), objectives),
            store,
            window,
            revalidation_window,
            population: Population::new(0, Vec::new()),
            diversity: 0.0,
            bred_with_rate: None,
            initialized: false,
            processed: false,
            resumed_from: None,
            generation_failures: 0,
            cancel: CancellationToken::new(),
            config,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn champion_tracker(&self) -> &ChampionTracker {
        &self.champion
    }

    pub fn evaluator(&self) -> &FitnessEvaluator {
        &self.evaluator
    }

    pub fn mutation_rate(&self) -> f64 {
        self.adaptive.rate()
    }

    pub fn snapshot(&self) -> EvolutionSnapshot {
        EvolutionSnapshot {
            generation: self.population.generation,
            population: self.population.clone(),
            pareto_front: self.population.pareto_front().into_iter().cloned().collect(),
            champion_state: self.champion.state(),
            champion: self.champion.champion().cloned(),
            champion_history: self.champion.history().to_vec(),
            diversity: self.diversity,
            mutation_rate: self.adaptive.rate(),
        }
    }

    /// RNG for breeding `generation`. Seeded runs derive it from the seed
    /// and the generation number only, so a resumed run breeds the same
    /// offspring as an uninterrupted one.
    fn rng_for(&self, generation: usize) -> StdRng {
        match self.config.evolution.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed.wrapping_add((generation as u64).wrapping_mul(GENERATION_SEED_STRIDE)))
            }
            None => StdRng::from_entropy(),
        }
    }

    /// Resume from the checkpoint directory when allowed, otherwise build a
    /// random generation 0.
    pub fn initialize(&mut self) -> Result<()> {
        if self.config.checkpoint.resume {
            if let Some(store) = &self.store {
                if let Some(checkpoint) = store.load_checkpoint()? {
                    self.restore(checkpoint)?;
                    self.initialized = true;
                    return Ok(());
                }
            }
        }

        let size = self.config.evolution.population_size;
        let mut rng = self.rng_for(0);
        let mut seen = HashSet::new();
        let mut individuals = Vec::with_capacity(size);

        let retries = self.config.evolution.max_duplicate_retries;
        while individuals.len() < size {
            let mut attempt = 0;
            let individual = loop {
                let templates = &self.config.evolution.templates;
                let template = templates[rng.gen_range(0..templates.len())];
                let offspring = Offspring {
                    template,
                    parameters: template.random_parameters(&mut rng),
                    code: None,
                };
                let (individual, generated) = self.finish_offspring(offspring, 0);
                if !generated {
                    self.generation_failures += 1;
                }
                if !seen.contains(individual.genome_id()) || attempt >= retries {
                    break individual;
                }
                attempt += 1;
            };
            seen.insert(individual.genome_id().to_string());
            individuals.push(individual);
        }

        info!(
            "Initialized generation 0 with {} individuals across {} templates",
            individuals.len(),
            self.config.evolution.templates.len()
        );
        self.population = Population::new(0, individuals);
        self.bred_with_rate = None;
        self.processed = false;
        self.initialized = true;
        Ok(())
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.population_size != self.config.evolution.population_size {
            warn!(
                "Checkpoint population size {} differs from configured {}; next generation uses the configured size",
                checkpoint.population_size, self.config.evolution.population_size
            );
        }

        self.champion = ChampionTracker::restore(
            self.config.champion.clone(),
            self.objectives.clone(),
            checkpoint.champion_document(),
        )?;
        self.adaptive = AdaptiveMutation::from_state(self.config.evolution.mutation.clone(), checkpoint.mutation);

        let mut population = Population::new(checkpoint.generation, checkpoint.individuals);
        population.size = checkpoint.population_size;
        population.validate()?;
        self.diversity = NoveltyAnalyzer::diversity(&population.individuals);
        self.population = population;
        self.bred_with_rate = None;
        self.processed = true;
        self.resumed_from = Some(checkpoint.generation);

        info!(
            "Resumed from checkpoint at generation {} ({} individuals, champion {:?})",
            checkpoint.generation,
            self.population.len(),
            self.champion.state()
        );
        Ok(())
    }

    /// Run until the configured number of generations is processed or a
    /// cancellation is observed.
    pub fn run<C: ProgressCallback>(&mut self, callback: &mut C) -> Result<RunSummary> {
        if !self.initialized {
            self.initialize()?;
        }

        let last_generation = self.config.evolution.num_generations.saturating_sub(1);
        let mut processed = 0;
        let mut cancelled = false;

        loop {
            if !self.processed {
                self.process_generation(callback)?;
                processed += 1;
            }
            if self.population.generation >= last_generation {
                break;
            }
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping after generation {}", self.population.generation);
                cancelled = true;
                break;
            }
            self.breed()?;
        }

        Ok(RunSummary {
            generations_processed: processed,
            final_generation: self.population.generation,
            cancelled,
            resumed_from: self.resumed_from,
            champion: self.champion.champion().cloned(),
            evaluator: self.evaluator.stats(),
            generation_failures: self.generation_failures,
        })
    }

    /// Evaluate, rank and annotate the current generation, update the
    /// champion and mutation rate, then persist.
    pub fn process_generation<C: ProgressCallback>(&mut self, callback: &mut C) -> Result<GenerationSummary> {
        let generation = self.population.generation;
        callback.on_generation_start(generation);

        let report = self
            .evaluator
            .evaluate_population(&mut self.population.individuals, &self.window);

        let fronts = self.ranker.rank(&mut self.population.individuals);
        self.novelty.annotate(&mut self.population.individuals);
        self.diversity = NoveltyAnalyzer::diversity(&self.population.individuals);

        let viable = self.population.viable_count(&self.objectives);
        if viable == 0 {
            error!(
                "Generation {} ended with zero viable individuals ({} failed, {} degenerate); halting",
                generation, report.failed, report.degenerate
            );
            return Err(ForgeError::NoViableIndividuals { generation });
        }

        let evaluator = &self.evaluator;
        let revalidation_window = self.revalidation_window;
        let decision = self.champion.observe(generation, &self.population.individuals, |record| {
            revalidate_record(evaluator, record, &revalidation_window)
        });
        callback.on_champion_decision(generation, &decision);

        let best_primary = self
            .population
            .viable(&self.objectives)
            .filter_map(|i| i.metrics.as_ref()?.primary_score(&self.objectives))
            .max_by(|a, b| a.total_cmp(b));
        self.adaptive.observe(self.diversity, best_primary);

        self.persist()?;
        self.processed = true;

        let summary = GenerationSummary {
            generation,
            population_size: self.population.len(),
            viable,
            degenerate: self.count_status(|s| matches!(s, EvaluationStatus::Degenerate { .. })),
            failed: self.count_status(|s| matches!(s, EvaluationStatus::Failed { .. })),
            front_size: fronts.first().map(Vec::len).unwrap_or(0),
            best_primary,
            diversity: self.diversity,
            mutation_rate: self.adaptive.rate(),
            bred_with_rate: self.bred_with_rate,
            champion_state: self.champion.state(),
            champion_id: self.champion.champion().map(|c| c.genome_id.clone()),
            evaluator: self.evaluator.stats(),
        };
        callback.on_generation_complete(&summary);
        Ok(summary)
    }

    fn count_status(&self, predicate: impl Fn(&EvaluationStatus) -> bool) -> usize {
        self.population.individuals.iter().filter(|i| predicate(&i.status)).count()
    }

    fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let checkpoint = Checkpoint {
            generation: self.population.generation,
            population_size: self.population.size,
            individuals: self.population.individuals.clone(),
            champion_state: self.champion.state(),
            champion_record: self.champion.champion().cloned(),
            champion_history: self.champion.history().to_vec(),
            mutation: self.adaptive.state().clone(),
        };
        store.save_checkpoint(&checkpoint)?;
        store.save_champion(&self.champion.document())
    }

    /// Replace the current generation with its offspring, bred at the
    /// current adaptive mutation rate.
    fn breed(&mut self) -> Result<()> {
        let next_generation = self.population.generation + 1;
        let size = self.config.evolution.population_size;
        let retries = self.config.evolution.max_duplicate_retries;
        let rate = self.adaptive.rate();
        let mut rng = self.rng_for(next_generation);

        let current = &self.population.individuals;
        let mut next: Vec<Individual> = Vec::with_capacity(size);
        let mut seen: HashSet<String> = HashSet::new();

        for idx in sorted_by_crowding(current) {
            if next.len() >= self.config.evolution.elitism_count {
                break;
            }
            let elite = &current[idx];
            if !elite.is_viable(&self.objectives) || seen.contains(elite.genome_id()) {
                continue;
            }
            let mut carried = elite.clone();
            carried.reset_annotations();
            seen.insert(carried.genome_id().to_string());
            next.push(carried);
        }
        let elites = next.len();

        while next.len() < size {
            let mut attempt = 0;
            let child = loop {
                let parents = self.selector.select_parents(current, 2, &mut rng);
                let (Some(&first), Some(&second)) = (parents.first(), parents.get(1)) else {
                    return Err(ForgeError::Generation(format!(
                        "No parents to breed generation {} from a population of {}",
                        next_generation,
                        current.len()
                    )));
                };

                let mut offspring = if rng.gen::<f64>() < self.config.evolution.crossover_rate {
                    let (offspring, failure) = self.crossover.cross(first, second, &mut rng);
                    if failure.is_some() {
                        self.generation_failures += 1;
                    }
                    offspring
                } else {
                    Offspring::from_parent(first, true)
                };
                self.mutator.mutate(&mut offspring, rate, &mut rng);

                let (individual, generated) = self.finish_offspring(offspring, next_generation);
                if !generated {
                    self.generation_failures += 1;
                }
                if !seen.contains(individual.genome_id()) || attempt >= retries {
                    break individual;
                }
                attempt += 1;
            };
            seen.insert(child.genome_id().to_string());
            next.push(child);
        }

        info!(
            "Bred generation {}: {} elites, {} offspring, mutation rate {:.4}",
            next_generation,
            elites,
            next.len() - elites,
            rate
        );
        self.population = Population::new(next_generation, next);
        self.bred_with_rate = Some(rate);
        self.processed = false;
        Ok(())
    }

    /// Attach generated code when code generation is on and the genome has
    /// none. A generator failure leaves a parameter-only individual and
    /// reports `false`.
    fn finish_offspring(&self, mut offspring: Offspring, generation: usize) -> (Individual, bool) {
        if !self.config.evolution.code_generation || offspring.code.is_some() {
            return (offspring.into_individual(generation), true);
        }
        let Some(generator) = &self.generator else {
            return (offspring.into_individual(generation), true);
        };

        let timeout = Some(Duration::from_millis(self.config.evolution.generator_timeout_ms));
        match generate_with_timeout(generator, &self.code_validator, offspring.template, &offspring.parameters, timeout) {
            Ok(code) => {
                offspring.code = Some(code);
                (offspring.into_individual(generation), true)
            }
            Err(e) => {
                let individual = offspring.into_individual(generation);
                warn!(
                    "Code generation failed for {}, keeping parameters only: {}",
                    individual.genome_id(),
                    e
                );
                (individual, false)
            }
        }
    }
}

fn revalidate_record(
    evaluator: &FitnessEvaluator,
    record: &ChampionRecord,
    window: &DataWindow,
) -> Result<MultiObjectiveMetrics> {
    let individual = record.to_individual();
    let evaluation = evaluator.revalidate(&individual, window)?;
    match evaluation.degenerate {
        Some(reason) => Err(ForgeError::DegenerateIndividual {
            genome_id: record.genome_id.clone(),
            reason,
        }),
        None => Ok(evaluation.in_sample),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::SyntheticOracle;

    fn engine() -> EvolutionEngine {
        let mut config = AppConfig::default();
        config.evolution.population_size = 8;
        config.evolution.elitism_count = 1;
        config.evolution.seed = Some(4);
        config.evaluation.concurrency_limit = 2;
        config.checkpoint.enabled = false;
        EvolutionEngine::new(config, Arc::new(SyntheticOracle::new(4)), None).unwrap()
    }

    #[test]
    fn test_breeding_fills_the_configured_size() {
        let mut engine = engine();
        engine.initialize().unwrap();
        engine.process_generation(&mut crate::LogProgressCallback).unwrap();

        engine.breed().unwrap();
        assert_eq!(engine.population().generation, 1);
        assert_eq!(engine.population().len(), 8);
        assert_eq!(engine.bred_with_rate, Some(engine.mutation_rate()));
    }

    #[test]
    fn test_breeding_without_parents_is_an_error() {
        let mut engine = engine();
        engine.initialized = true;

        assert!(matches!(engine.breed(), Err(ForgeError::Generation(_))));
        assert!(engine.population().is_empty());
        assert_eq!(engine.population().generation, 0);
    }
}

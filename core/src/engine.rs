//! The simulation engine: one run of the SME compliance model.
//!
//! CONSTRUCTION (once):
//!   1. Validate the configuration
//!   2. Synthesize the population       (population stream)
//!   3. Align incidence, if configured
//!   4. Calibrate underpayment intensity
//!   5. Build the peer network          (network stream)
//!
//! EXECUTION ORDER per tick (fixed, documented, never reordered):
//!   1. Clear per-tick inputs, capture the peer snapshot
//!   2. InterventionScheduler
//!   3. AuditAllocator
//!   4. BehaviourSubsystem (every entity, random order)
//!   5. Collect metrics
//!   6. Advance the clock
//!
//! RULES:
//!   - Stages execute in registration order, every tick.
//!   - Peer reads see only the state settled before the tick began.
//!   - All randomness flows through the RngBank.
//!   - With a store attached, every event is recorded in the event log.

use crate::{
    audit_subsystem::AuditAllocator,
    behaviour_subsystem::BehaviourSubsystem,
    calibration::{align_incidence, TaxGapLink},
    clock::SimClock,
    config::SimConfig,
    error::{SimError, SimResult},
    event::{EventLogEntry, SimEvent},
    intervention_subsystem::InterventionScheduler,
    metrics::{EntityChange, RunReport, RunSummary, StepMetrics},
    network::PeerNetwork,
    population::{synthesize, Population},
    rng::{RngBank, StageSlot},
    snapshot::{EngineSnapshot, PeerSnapshot, SNAPSHOT_INTERVAL},
    store::SimStore,
    subsystem::{SimSubsystem, TickContext, TickInputs},
    types::{RunId, Tick},
};

pub struct SimEngine {
    pub run_id:  RunId,
    pub clock:   SimClock,
    rng_bank:    RngBank,
    config:      SimConfig,
    population:  Population,
    network:     PeerNetwork,
    link:        TaxGapLink,
    inputs:      TickInputs,
    total_cost:  f64,
    stages:      Vec<(StageSlot, Box<dyn SimSubsystem>)>,
    store:       Option<SimStore>,
    last_events: Vec<SimEvent>,
}

impl SimEngine {
    /// Build a fully wired engine. Fails on an invalid configuration.
    pub fn build(run_id: RunId, seed: u64, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let rng_bank = RngBank::new(seed);

        let mut population =
            synthesize(&config.population, &mut rng_bank.for_stage(StageSlot::Population))?;
        if config.calibration.align_incidence {
            align_incidence(&mut population, config.calibration.noncompliance_target_rate);
        }
        let link = TaxGapLink::calibrate(&population, &config.calibration);
        let network = PeerNetwork::generate(
            population.len(),
            config.network.mean_degree,
            &mut rng_bank.for_stage(StageSlot::Network),
        );

        let mut engine = Self {
            clock: SimClock::new(run_id.clone()),
            run_id,
            rng_bank,
            population,
            network,
            link,
            inputs: TickInputs::default(),
            total_cost: 0.0,
            stages: Vec::new(),
            store: None,
            last_events: Vec::new(),
            config,
        };

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(
            StageSlot::Scheduler,
            Box::new(InterventionScheduler::new(
                engine.config.communication.clone(),
                engine.config.population.compliance_target,
            )),
        );
        engine.register(
            StageSlot::Audit,
            Box::new(AuditAllocator::new(engine.config.audit.clone())),
        );
        engine.register(
            StageSlot::Behaviour,
            Box::new(BehaviourSubsystem::new(engine.config.behaviour.clone())),
        );

        engine.last_events = engine.construction_events();
        log::info!(
            "engine: run '{}' built with seed {}, {} entities, {} edges, u = {:.6}",
            engine.run_id,
            seed,
            engine.population.len(),
            engine.network.edge_count(),
            engine.link.underpayment_intensity
        );
        Ok(engine)
    }

    /// Build and attach a migrated store holding a run record for `run_id`.
    /// Construction events are written at tick 0.
    pub fn build_with_store(
        run_id: RunId,
        seed: u64,
        config: SimConfig,
        store: SimStore,
    ) -> SimResult<Self> {
        let mut engine = Self::build(run_id, seed, config)?;
        engine.attach_store(store)?;
        Ok(engine)
    }

    /// Engine on `SimConfig::default_test()` with a migrated in-memory store.
    pub fn build_test(run_id: RunId, seed: u64) -> SimResult<Self> {
        Self::build_test_with(run_id, seed, SimConfig::default_test())
    }

    pub fn build_test_with(run_id: RunId, seed: u64, config: SimConfig) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.insert_run(&run_id, seed, "0.1.0-test", &serde_json::to_string(&config)?)?;
        Self::build_with_store(run_id, seed, config, store)
    }

    pub fn attach_store(&mut self, store: SimStore) -> SimResult<()> {
        for event in &self.last_events {
            store.append_event(&EventLogEntry::new(&self.run_id, 0, "engine", event)?)?;
        }
        self.store = Some(store);
        Ok(())
    }

    fn register(&mut self, slot: StageSlot, stage: Box<dyn SimSubsystem>) {
        self.stages.push((slot, stage));
    }

    fn construction_events(&self) -> Vec<SimEvent> {
        let mut events = vec![SimEvent::RunInitialized {
            run_id:                 self.run_id.clone(),
            seed:                   self.rng_bank.master_seed(),
            population:             self.population.len(),
            edges:                  self.network.edge_count(),
            underpayment_intensity: self.link.underpayment_intensity,
        }];
        if self.link.saturated {
            events.push(SimEvent::CalibrationSaturated {
                raw_intensity:          self.link.raw_intensity,
                weighted_noncompliance: self.link.weighted_noncompliance,
                target_gap_rate:        self.config.calibration.tax_gap_target_rate,
            });
        }
        events
    }

    /// Advance one tick and return its metrics.
    pub fn step(&mut self) -> SimResult<StepMetrics> {
        let tick = self.clock.current_tick;
        self.inputs.reset();
        let snapshot = PeerSnapshot::capture(&self.population);

        let mut tick_events: Vec<(&'static str, SimEvent)> =
            vec![("engine", SimEvent::TickStarted { tick })];

        for (slot, stage) in &mut self.stages {
            let mut rng = self.rng_bank.for_stage_at_tick(*slot, tick);
            let mut ctx = TickContext {
                tick,
                calendar:   &self.config.calendar,
                population: &mut self.population,
                network:    &self.network,
                snapshot:   &snapshot,
                inputs:     &mut self.inputs,
            };
            let name = stage.name();
            let new_events = stage.update(&mut ctx, &mut rng)?;
            tick_events.extend(new_events.into_iter().map(|e| (name, e)));
        }

        self.total_cost += self.inputs.tick_cost;
        let metrics = self.collect_metrics(tick + 1);
        tick_events.push((
            "engine",
            SimEvent::TickCompleted {
                tick,
                mean_propensity: metrics.overall_mean,
                tick_cost:       self.inputs.tick_cost,
            },
        ));

        if let Some(store) = &self.store {
            for (stage, event) in &tick_events {
                store.append_event(&EventLogEntry::new(&self.run_id, tick, stage, event)?)?;
            }
            store.save_metrics(&self.run_id, &metrics)?;
        }

        let completed = self.clock.advance();
        if self.store.is_some() && completed % SNAPSHOT_INTERVAL == 0 {
            self.take_snapshot(completed)?;
        }

        log::debug!(
            "tick={tick} engine: mean {:.4}, gap rate {:.5}, cost {:.2}",
            metrics.overall_mean,
            metrics.tax_gap_rate,
            self.total_cost
        );
        self.last_events = tick_events.into_iter().map(|(_, e)| e).collect();
        Ok(metrics)
    }

    /// Run n ticks, returning each tick's metrics.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<Vec<StepMetrics>> {
        (0..n).map(|_| self.step()).collect()
    }

    /// Run n ticks from the current state and assemble the full report.
    /// The summary is persisted when a store is attached.
    pub fn run_report(&mut self, n: u64) -> SimResult<RunReport> {
        let initial = self.metrics();
        let steps = self.run_ticks(n)?;
        let final_metrics = self.metrics();
        let summary = RunSummary::from_gaps(
            initial.tax_gap.total.gap,
            final_metrics.tax_gap.total.gap,
            self.total_cost,
        );
        if let Some(store) = &self.store {
            store.save_summary(&self.run_id, &summary)?;
        }
        log::info!(
            "engine: run '{}' finished after {} ticks, gap reduction {:.2}, cost {:.2}, ROI {:.3}",
            self.run_id,
            self.clock.current_tick,
            summary.tax_gap_reduction,
            summary.total_cost,
            summary.roi_ratio
        );
        Ok(RunReport {
            run_id: self.run_id.clone(),
            seed: self.rng_bank.master_seed(),
            config: self.config.clone(),
            initial,
            steps,
            final_metrics,
            summary,
            entity_changes: EntityChange::collect(&self.population),
        })
    }

    /// Metrics for the current state, labelled with completed steps.
    pub fn metrics(&self) -> StepMetrics {
        self.collect_metrics(self.clock.current_tick)
    }

    fn collect_metrics(&self, step: Tick) -> StepMetrics {
        StepMetrics::collect(
            step,
            &self.population,
            &self.link,
            &self.inputs,
            self.total_cost,
            self.config.behaviour.high_compliance_threshold,
        )
    }

    pub fn tax_gap_rate(&self) -> f64 {
        self.link.tax_gap_rate(self.population.entities())
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick
    }

    pub fn seed(&self) -> u64 {
        self.rng_bank.master_seed()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn network(&self) -> &PeerNetwork {
        &self.network
    }

    pub fn calibration(&self) -> &TaxGapLink {
        &self.link
    }

    /// Inputs of the most recent tick.
    pub fn inputs(&self) -> &TickInputs {
        &self.inputs
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Events of the most recent tick, or the construction events before
    /// the first one.
    pub fn last_events(&self) -> &[SimEvent] {
        &self.last_events
    }

    pub fn store(&self) -> Option<&SimStore> {
        self.store.as_ref()
    }

    /// Query events for a specific tick from the attached store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_tick(&self, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        let store = self.store.as_ref().ok_or_else(|| SimError::StoreNotAttached {
            run_id: self.run_id.clone(),
        })?;
        store.events_for_tick(&self.run_id, tick)
    }

    fn take_snapshot(&self, tick: Tick) -> SimResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = EngineSnapshot {
            run_id:     self.run_id.clone(),
            tick,
            clock:      self.clock.clone(),
            total_cost: self.total_cost,
            link:       self.link,
            entities:   self.population.entities().to_vec(),
        };
        let json = serde_json::to_string(&snapshot)?;
        store.save_snapshot(&self.run_id, tick, &json)?;
        log::debug!("Snapshot saved at tick {tick}");
        Ok(())
    }
}

//! The observe → plan → act → reflect → curate tick orchestrator.
//!
//! One [`FeedbackLoop`] instance drives one episode. It borrows its
//! collaborators so planner, memory and playbook state survive across
//! episodes while each episode gets a fresh environment and engine.

use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument};

use crate::ace::{Curator, DeltaRecord, PlaybookStore, Reflector};
use crate::core::execution::ExecutionEngine;
use crate::core::result_format::ResultFormatter;
use crate::core::reward::RewardSynthesizer;
use crate::core::state_format::StateFormatter;
use crate::core::types::{Channel, Event, LoopSnapshot, Observation, Severity};
use crate::env::Environment;
use crate::memory::MemoryManager;
use crate::planner::Planner;
use crate::snapshots::SnapshotSink;

/// The reflect → curate → apply stages plus the refine schedule, bundled so
/// the loop can treat knowledge curation as a single optional collaborator.
pub struct CurationPipeline<'a> {
    store: &'a PlaybookStore,
    reflector: &'a Reflector,
    curator: Curator,
    refine_interval: u64,
}

impl<'a> CurationPipeline<'a> {
    pub fn new(
        store: &'a PlaybookStore,
        reflector: &'a Reflector,
        curator: Curator,
        refine_interval: u64,
    ) -> Self {
        Self {
            store,
            reflector,
            curator,
            refine_interval,
        }
    }

    /// Run the three stages for one finished tick. Rejections become warn
    /// events and `rejected` records; store I/O errors propagate.
    fn process(
        &self,
        snapshot: &LoopSnapshot,
        playbook_context: &[String],
    ) -> Result<(Vec<DeltaRecord>, Vec<Event>)> {
        let deltas = self.reflector.propose(snapshot, playbook_context);
        let outcome = self.curator.curate(deltas, self.store);

        let mut updates = Vec::new();
        let mut events = Vec::new();
        for item in &outcome.rejected {
            events.push(
                Event::new(
                    Channel::Events,
                    Severity::Warn,
                    format!("Playbook delta rejected: {}", item.delta.target),
                )
                .with_field("reason", json!(item.reason))
                .with_field("tick", json!(snapshot.tick)),
            );
            updates.push(DeltaRecord::rejected(&item.delta, &item.reason));
        }
        if !outcome.accepted.is_empty() {
            let (applied, applied_events) =
                self.store.apply_deltas(&outcome.accepted, snapshot.tick)?;
            updates.extend(applied.iter().map(DeltaRecord::from));
            events.extend(applied_events);
        }
        if self.refine_interval > 0 && snapshot.tick % self.refine_interval == 0 {
            events.push(self.store.refine(&format!("tick {}", snapshot.tick))?);
        }
        Ok((updates, events))
    }
}

/// Orchestrates one episode: `reset → {tick}* → terminal`.
///
/// Environment and planner failures are their own responsibility (both
/// traits are total); memory and playbook I/O errors stop the run.
pub struct FeedbackLoop<'a> {
    environment: &'a mut dyn Environment,
    planner: &'a mut dyn Planner,
    engine: &'a ExecutionEngine,
    state_formatter: &'a StateFormatter,
    result_formatter: &'a ResultFormatter,
    reward_synthesizer: &'a RewardSynthesizer,
    memory: &'a mut MemoryManager,
    curation: Option<CurationPipeline<'a>>,
    sinks: Vec<Box<dyn SnapshotSink + 'a>>,
}

impl<'a> FeedbackLoop<'a> {
    pub fn new(
        environment: &'a mut dyn Environment,
        planner: &'a mut dyn Planner,
        engine: &'a ExecutionEngine,
        state_formatter: &'a StateFormatter,
        result_formatter: &'a ResultFormatter,
        reward_synthesizer: &'a RewardSynthesizer,
        memory: &'a mut MemoryManager,
    ) -> Self {
        Self {
            environment,
            planner,
            engine,
            state_formatter,
            result_formatter,
            reward_synthesizer,
            memory,
            curation: None,
            sinks: Vec::new(),
        }
    }

    pub fn with_curation(mut self, curation: CurationPipeline<'a>) -> Self {
        self.curation = Some(curation);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn SnapshotSink + 'a>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Run up to `max_ticks` ticks, stopping early on a terminal observation.
    /// Returns every tick's snapshot in order.
    #[instrument(skip_all, fields(max_ticks))]
    pub fn run(&mut self, max_ticks: u64) -> Result<Vec<LoopSnapshot>> {
        let mut snapshots = Vec::new();
        let mut observation = self.environment.reset();
        let mut previous_unknown = observation.data.unknown;

        for _ in 0..max_ticks {
            let highlights = self.memory.highlights(&observation);
            let formatted_state = self.state_formatter.format(&observation, &highlights);
            let playbook_context = match &self.curation {
                Some(pipeline) => pipeline.store.get_context()?,
                None => Vec::new(),
            };
            let mut memory_dump = self.memory.export();
            if !playbook_context.is_empty() {
                memory_dump.playbook = playbook_context.clone();
            }
            let allowed = self.environment.action_schema().to_vec();
            let plan = self.planner.plan(&formatted_state, &allowed, &memory_dump);

            let outcome = self.engine.execute(&mut *self.environment, &plan);
            let mut events = self.engine.emit_events(&plan, &outcome.result);
            events.extend(observation_events(&outcome.steps));

            let curiosity_signal = (previous_unknown - outcome.observation.data.unknown).max(0.0);
            let mut reward_observation = outcome.observation.clone();
            reward_observation.reward = outcome.reward;
            let reward = self
                .reward_synthesizer
                .synthesize(&reward_observation, curiosity_signal);
            let summary = self
                .result_formatter
                .build_summary(&reward_observation, &outcome.result);
            let reflection = self.planner.reflect(&summary, &reward);
            self.memory.update(&reflection)?;

            let mut snapshot = LoopSnapshot {
                tick: reward_observation.tick,
                observation: reward_observation,
                formatted_state,
                action_plan: plan,
                execution: outcome.result,
                reward,
                reflection,
                events: Vec::new(),
                playbook_updates: Vec::new(),
                playbook_stats: None,
            };

            if let Some(pipeline) = &self.curation {
                let (updates, curation_events) = pipeline.process(&snapshot, &playbook_context)?;
                snapshot.playbook_updates = updates;
                events.extend(curation_events);
                snapshot.playbook_stats = Some(pipeline.store.stats()?);
            }
            snapshot.events = events;

            info!(
                tick = snapshot.tick,
                reward = snapshot.reward.total(),
                life = snapshot.observation.data.life,
                "tick complete"
            );
            for sink in &mut self.sinks {
                sink.publish(&snapshot);
            }
            snapshots.push(snapshot);

            observation = outcome.observation;
            previous_unknown = observation.data.unknown;
            if observation.done {
                break;
            }
        }
        Ok(snapshots)
    }
}

/// One `state`-channel info event per inline message an intermediate
/// observation carried, annotated with the tick and the four core signals.
fn observation_events(observations: &[Observation]) -> Vec<Event> {
    let mut timeline = Vec::new();
    for obs in observations {
        for message in &obs.data.events {
            timeline.push(
                Event::new(Channel::State, Severity::Info, message.clone())
                    .with_field("tick", json!(obs.tick))
                    .with_field("life", json!(obs.data.life))
                    .with_field("resources", json!(obs.data.resources))
                    .with_field("danger", json!(obs.data.danger))
                    .with_field("unknown", json!(obs.data.unknown)),
            );
        }
    }
    timeline
}

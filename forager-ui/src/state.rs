//! Shared application state for the UI server.
//!
//! The ingest task folds snapshots into three bounded ring buffers (full
//! snapshots, per-tick metric records, flattened events) and announces each
//! new tick on a broadcast channel that feeds the SSE endpoint. Handlers only
//! ever read the buffers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

use forager::core::types::{Event, LoopSnapshot};

/// Fixed capacity of each ring buffer; older entries are evicted.
pub const BUFFER_CAPACITY: usize = 512;

/// One per-tick timeline record, extracted from a snapshot at ingest time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub tick: u64,
    pub life: f64,
    pub resources: f64,
    pub danger: f64,
    pub unknown: f64,
    pub reward: f64,
    pub external_reward: f64,
    pub internal_reward: f64,
    /// Last fear note of the tick's reflection, empty when there was none.
    pub fear_note: String,
    /// Last curiosity note of the tick's reflection, empty when there was none.
    pub curiosity_note: String,
}

impl From<&LoopSnapshot> for MetricRecord {
    fn from(snapshot: &LoopSnapshot) -> Self {
        Self {
            tick: snapshot.tick,
            life: snapshot.observation.data.life,
            resources: snapshot.observation.data.resources,
            danger: snapshot.observation.data.danger,
            unknown: snapshot.observation.data.unknown,
            reward: snapshot.reward.total(),
            external_reward: snapshot.reward.external_reward,
            internal_reward: snapshot.reward.internal_reward,
            fear_note: snapshot
                .reflection
                .fear_updates
                .last()
                .cloned()
                .unwrap_or_default(),
            curiosity_note: snapshot
                .reflection
                .curiosity_updates
                .last()
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// The three ring buffers the API serves from.
#[derive(Default)]
pub struct Buffers {
    pub snapshots: VecDeque<LoopSnapshot>,
    pub metrics: VecDeque<MetricRecord>,
    pub events: VecDeque<Event>,
}

impl Buffers {
    /// Fold one snapshot into all three buffers and return its metric record.
    pub fn absorb(&mut self, snapshot: LoopSnapshot) -> MetricRecord {
        let metric = MetricRecord::from(&snapshot);
        for event in &snapshot.events {
            push_bounded(&mut self.events, event.clone());
        }
        push_bounded(&mut self.metrics, metric.clone());
        push_bounded(&mut self.snapshots, snapshot);
        metric
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T) {
    if buffer.len() == BUFFER_CAPACITY {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// Shared state accessible from all request handlers and the ingest task.
#[derive(Clone)]
pub struct AppState {
    /// Run directory whose episode snapshot files this server tails.
    pub run_dir: PathBuf,
    pub buffers: Arc<RwLock<Buffers>>,
    /// Broadcast sender feeding SSE clients one record per ingested tick.
    pub tick_updates: Arc<broadcast::Sender<MetricRecord>>,
}

impl AppState {
    pub fn new(run_dir: PathBuf) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            run_dir,
            buffers: Arc::new(RwLock::new(Buffers::default())),
            tick_updates: Arc::new(tx),
        }
    }

    /// Buffer one snapshot and announce it to SSE subscribers.
    pub async fn ingest(&self, snapshot: LoopSnapshot) {
        let metric = {
            let mut buffers = self.buffers.write().await;
            buffers.absorb(snapshot)
        };
        let _ = self.tick_updates.send(metric);
    }
}

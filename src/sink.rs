// =============================================================================
// Decision Sinks — where finished packets are handed off
// =============================================================================
//
// Hand-off is fire-and-forget: `submit` returns nothing and a sink that
// fails to persist logs the failure itself. The decision is already made.
// =============================================================================

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::warn;

use crate::decision::DecisionPacket;
use crate::types::Action;

/// Maximum number of recent decisions to retain.
pub const MAX_RECENT_DECISIONS: usize = 100;

pub trait DecisionSink: Send + Sync {
    fn submit(&self, packet: &DecisionPacket);
}

// ── In-memory ledger ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: u64,
    pub execute: u64,
    pub wait: u64,
    pub skip: u64,
}

/// Ring buffer of recent packets plus lifetime counters.
pub struct DecisionLedger {
    capacity: usize,
    recent: RwLock<VecDeque<DecisionPacket>>,
    stats: Mutex<LedgerStats>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECENT_DECISIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
            stats: Mutex::new(LedgerStats::default()),
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<DecisionPacket> {
        self.recent.read().iter().rev().cloned().collect()
    }

    pub fn latest_for(&self, symbol: &str) -> Option<DecisionPacket> {
        self.recent
            .read()
            .iter()
            .rev()
            .find(|p| p.symbol == symbol)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.recent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.read().is_empty()
    }

    pub fn stats(&self) -> LedgerStats {
        *self.stats.lock()
    }
}

impl Default for DecisionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionSink for DecisionLedger {
    fn submit(&self, packet: &DecisionPacket) {
        {
            let mut stats = self.stats.lock();
            stats.total += 1;
            match packet.action {
                Action::Execute => stats.execute += 1,
                Action::Wait => stats.wait += 1,
                Action::Skip => stats.skip += 1,
            }
        }
        let mut recent = self.recent.write();
        recent.push_back(packet.clone());
        while recent.len() > self.capacity {
            recent.pop_front();
        }
    }
}

// ── JSON lines ──────────────────────────────────────────────────────────────

/// Writes each packet as one JSON line to any writer (stdout, a file, ...).
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> DecisionSink for JsonLinesSink<W> {
    fn submit(&self, packet: &DecisionPacket) {
        let line = match packet.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(id = %packet.id, error = %e, "failed to serialise decision packet");
                return;
            }
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!(id = %packet.id, error = %e, "failed to write decision packet");
        }
    }
}

// ── Fan-out ─────────────────────────────────────────────────────────────────

/// Forwards every packet to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DecisionSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn DecisionSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn DecisionSink>) {
        self.sinks.push(sink);
    }
}

impl DecisionSink for FanoutSink {
    fn submit(&self, packet: &DecisionPacket) {
        for sink in &self.sinks {
            sink.submit(packet);
        }
    }
}

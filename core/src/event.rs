//! Everything the engine and its stages report, tick by tick.
//!
//! Stages never call each other. They share the per-tick inputs ledger and
//! report what they did here, so a run can be replayed from the event log.

use crate::types::{EntityId, GroupKey, RunId, Tick};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended. Stored payloads depend on the tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id:                 RunId,
        seed:                   u64,
        population:             usize,
        edges:                  usize,
        underpayment_intensity: f64,
    },
    CalibrationSaturated {
        raw_intensity:          f64,
        weighted_noncompliance: f64,
        target_gap_rate:        f64,
    },
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick:            Tick,
        mean_propensity: f64,
        tick_cost:       f64,
    },

    // ── Communication ──────────────────────────────
    CommunicationSent {
        tick:    Tick,
        channel: String,
        /// Effect after the urgency multiplier.
        effect:  f64,
        reached: usize,
        cost:    f64,
        urgent:  bool,
    },
    WarningVisitIssued {
        tick:       Tick,
        group:      GroupKey,
        group_mean: f64,
        effect:     f64,
        reached:    usize,
        cost:       f64,
    },

    // ── Audits ─────────────────────────────────────
    AuditCampaignOpened {
        tick:     Tick,
        targeted: usize,
        selected: usize,
    },
    EntityAudited {
        tick:      Tick,
        entity_id: EntityId,
        group:     GroupKey,
        tier:      String,
        selection: AuditSelection,
        effect:    f64,
        cost:      f64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditSelection {
    Random,
    Targeted,
}

impl SimEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }       => "run_initialized",
            Self::CalibrationSaturated { .. } => "calibration_saturated",
            Self::TickStarted { .. }          => "tick_started",
            Self::TickCompleted { .. }        => "tick_completed",
            Self::CommunicationSent { .. }    => "communication_sent",
            Self::WarningVisitIssued { .. }   => "warning_visit_issued",
            Self::AuditCampaignOpened { .. }  => "audit_campaign_opened",
            Self::EntityAudited { .. }        => "entity_audited",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub tick:       Tick,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized SimEvent
}

impl EventLogEntry {
    pub fn new(run_id: &str, tick: Tick, stage: &str, event: &SimEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id:         None,
            run_id:     run_id.to_string(),
            tick,
            stage:      stage.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        })
    }
}

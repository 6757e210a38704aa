/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::model::fairness::LastBatch;
use crate::model::kinds::{AssignmentStatus, MatchKey, MatchKind, Stage};
use crate::model::pool::PoolMatch;
use crate::model::queue::QueueEntry;
use crate::schema::{court, court_assignment};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use schemars::JsonSchema;
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// # Court
#[derive(Queryable, Selectable, Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = court)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Court {
    pub id: i32,
    pub label: String,
    /// Free courts are filled in this order
    pub sort_order: i32,
}

/// # Court Assignment
/// A match on a court. A row with no match id is a leftover "empty" row and is cleared on
/// sight.
#[derive(
    Queryable, Selectable, Insertable, Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq,
)]
#[diesel(table_name = court_assignment)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourtAssignment {
    pub id: Uuid,
    pub court_id: i32,
    pub stage: Stage,
    pub match_kind: MatchKind,
    pub group_match_id: Option<Uuid>,
    pub knockout_match_id: Option<Uuid>,
    pub status: AssignmentStatus,
    pub assigned_at: NaiveDateTime,
    pub cleared_at: Option<NaiveDateTime>,
}

impl CourtAssignment {
    pub fn new(court_id: i32, stage: Stage, key: MatchKey, assigned_at: NaiveDateTime) -> Self {
        let (group_match_id, knockout_match_id) = match key.kind {
            MatchKind::Group => (Some(key.id), None),
            MatchKind::Knockout => (None, Some(key.id)),
        };
        CourtAssignment {
            id: Uuid::new_v4(),
            court_id,
            stage,
            match_kind: key.kind,
            group_match_id,
            knockout_match_id,
            status: AssignmentStatus::Active,
            assigned_at,
            cleared_at: None,
        }
    }

    pub fn key(&self) -> Option<MatchKey> {
        match self.match_kind {
            MatchKind::Group => self.group_match_id.map(MatchKey::group),
            MatchKind::Knockout => self.knockout_match_id.map(MatchKey::knockout),
        }
    }

    pub fn is_ghost(&self) -> bool {
        self.key().is_none()
    }
}

/// # Blocked Match
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct BlockedMatch {
    pub key: MatchKey,
    pub reason: String,
}

/// # Schedule Config
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub stage: Stage,
    pub auto_schedule: bool,
    pub last_batch: LastBatch,
}

impl ScheduleConfig {
    pub fn new(stage: Stage) -> Self {
        ScheduleConfig {
            stage,
            auto_schedule: false,
            last_batch: LastBatch::default(),
        }
    }
}

/// Everything the scheduler reads for one stage, taken in one go.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub stage: Stage,
    /// Ordered by `sort_order`, then id
    pub courts: Vec<Court>,
    pub locked: BTreeSet<i32>,
    /// ACTIVE rows of the stage
    pub active: Vec<CourtAssignment>,
    pub pool: Vec<PoolMatch>,
    /// Forced matches in insertion order
    pub forced: Vec<MatchKey>,
    pub blocked: Vec<BlockedMatch>,
    pub config: ScheduleConfig,
}

impl Snapshot {
    pub fn held(&self) -> HashSet<MatchKey> {
        self.active.iter().filter_map(CourtAssignment::key).collect()
    }

    pub fn blocked_keys(&self) -> HashSet<MatchKey> {
        self.blocked.iter().map(|b| b.key).collect()
    }

    pub fn find(&self, key: MatchKey) -> Option<&PoolMatch> {
        self.pool.iter().find(|m| m.key == key)
    }

    pub fn court(&self, court: i32) -> Option<&Court> {
        self.courts.iter().find(|c| c.id == court)
    }

    pub fn active_on(&self, court: i32) -> Option<&CourtAssignment> {
        self.active.iter().find(|a| a.court_id == court)
    }

    /// Unlocked courts with no ACTIVE row, in fill order.
    pub fn free_courts(&self) -> Vec<&Court> {
        self.courts
            .iter()
            .filter(|c| !self.locked.contains(&c.id) && self.active_on(c.id).is_none())
            .collect()
    }
}

/// # Court View
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct CourtView {
    pub court: Court,
    pub locked: bool,
    pub assignment: Option<CourtAssignment>,
    pub playing: Option<PoolMatch>,
}

/// # Debug Counters
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Default)]
pub struct DebugCounters {
    pub eligible: usize,
    pub in_play_players: usize,
    pub recent_players: usize,
    pub free_courts: usize,
    pub locked_courts: usize,
    pub ghosts_cleared: usize,
    pub invalid_cleared: usize,
}

/// # Schedule State
/// What every court is doing, what comes next and why.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct ScheduleState {
    pub stage: Stage,
    pub auto_schedule: bool,
    pub courts: Vec<CourtView>,
    pub queue: Vec<QueueEntry>,
    pub upcoming: Vec<QueueEntry>,
    pub blocked: Vec<BlockedMatch>,
    pub counters: DebugCounters,
}

/// # Reconcile Report
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Default)]
pub struct ReconcileReport {
    pub ghosts_cleared: usize,
    /// Rows whose match finished, became ineligible or got blocked
    pub invalid_cleared: usize,
    /// Rows whose match no longer exists
    pub canceled: usize,
    pub forced_pruned: usize,
}

/// # Fill Stop
/// Why the fill loop ended. None of these are failures.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillStop {
    NoFreeCourt,
    NoEligibleMatch,
    NothingAssignable,
    PassLimit,
}

/// # Fill Report
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct FillReport {
    pub stage: Stage,
    pub passes: usize,
    pub assigned: Vec<CourtAssignment>,
    pub ghosts_cleared: usize,
    pub invalid_cleared: usize,
    /// Passes lost to another writer taking the court or match first
    pub conflicts: usize,
    pub stop: FillStop,
}

/// # Queue Return
/// Outcome of sending a court's match back to the queue.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueueReturn {
    /// Court left free, auto schedule is off
    Emptied { court: i32, returned: MatchKey },
    /// Next assignable match put straight on the court
    Swapped {
        court: i32,
        returned: MatchKey,
        next: CourtAssignment,
    },
    /// Auto schedule is on but nothing could take the court
    NoNextMatch { court: i32, returned: MatchKey },
    CourtAlreadyEmpty { court: i32 },
}

/// # Completion Report
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub cleared: CourtAssignment,
    pub fill: Option<FillReport>,
}

/// # Block Report
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct BlockReport {
    pub key: MatchKey,
    /// Assignments pulled off court, in any stage
    pub canceled: Vec<CourtAssignment>,
    pub fills: Vec<FillReport>,
}

/// # Assign Request
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct AssignRequest {
    pub court: i32,
    pub kind: MatchKind,
    pub match_id: Uuid,
}

/// # Match Reference
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct MatchRef {
    pub kind: MatchKind,
    pub match_id: Uuid,
    /// Only read when blocking
    #[serde(default)]
    pub reason: Option<String>,
}

impl MatchRef {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            kind: self.kind,
            id: self.match_id,
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Court assignment: manual moves, the auto fill loop and invalid row cleanup.
//!
//! Nothing here takes a lock. Two writers racing for the same court or match are separated
//! by the store's uniqueness rules; the loser sees `AlreadyAssigned` and, inside the fill
//! loop, simply tries again on the next pass with fresh state.
use crate::error::{Error, Result};
use crate::model::court::model::{
    BlockReport, CompletionReport, CourtAssignment, CourtView, DebugCounters, FillReport,
    FillStop, QueueReturn, ReconcileReport, ScheduleState, Snapshot,
};
use crate::model::court::store::ScheduleStore;
use crate::model::fairness::{FairnessContext, LastBatchEntry};
use crate::model::kinds::{AssignmentStatus, MatchKey, Stage};
use crate::model::pool::PoolMatch;
use crate::model::queue::{build_queue, upcoming, QueueEntry};
use crate::model::sys::SysSettings;
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashSet};

fn rank(
    snap: &Snapshot,
    settings: &SysSettings,
    exclude: Option<MatchKey>,
) -> (FairnessContext, Vec<QueueEntry>) {
    let held = snap.held();
    let mut blocked = snap.blocked_keys();
    blocked.extend(exclude);
    let ctx = FairnessContext::new(
        &snap.pool,
        &held,
        &snap.config.last_batch,
        settings.recent_window,
    );
    let queue = build_queue(&snap.pool, &held, &blocked, &snap.forced, &ctx);
    (ctx, queue)
}

/// Closes ACTIVE rows that should not be ACTIVE any more and drops stale forced entries.
pub fn reconcile<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<ReconcileReport> {
    let report = store.transaction(|s| {
        let snap = s.snapshot(stage, settings.recent_window)?;
        let blocked = snap.blocked_keys();
        let mut report = ReconcileReport::default();
        let mut still_held = HashSet::new();
        for row in &snap.active {
            let Some(key) = row.key() else {
                s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
                report.ghosts_cleared += 1;
                continue;
            };
            match snap.find(key) {
                None => {
                    s.close_assignment(row.id, AssignmentStatus::Canceled, now)?;
                    report.canceled += 1;
                }
                Some(m) if !m.is_list_eligible() || blocked.contains(&key) => {
                    s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
                    report.invalid_cleared += 1;
                }
                Some(_) => {
                    still_held.insert(key);
                }
            }
        }
        for key in &snap.forced {
            let keep = snap.find(*key).is_some_and(PoolMatch::is_list_eligible)
                && !blocked.contains(key)
                && !still_held.contains(key);
            if !keep {
                s.remove_forced(stage, *key)?;
                report.forced_pruned += 1;
            }
        }
        Ok(report)
    })?;
    if report != ReconcileReport::default() {
        tracing::info!(
            %stage,
            ghosts = report.ghosts_cleared,
            invalid = report.invalid_cleared,
            canceled = report.canceled,
            forced_pruned = report.forced_pruned,
            "assignments reconciled"
        );
    }
    Ok(report)
}

/// Current courts, queue and preview for `stage`, computed from scratch.
pub fn state<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<ScheduleState> {
    let reconciled = reconcile(store, stage, settings, now)?;
    let snap = store.snapshot(stage, settings.recent_window)?;
    let (ctx, queue) = rank(&snap, settings, None);
    let preview = upcoming(&queue, settings.upcoming_limit);
    let courts = snap
        .courts
        .iter()
        .map(|court| {
            let assignment = snap.active_on(court.id).cloned();
            let playing = assignment
                .as_ref()
                .and_then(CourtAssignment::key)
                .and_then(|key| snap.find(key))
                .cloned();
            CourtView {
                court: court.clone(),
                locked: snap.locked.contains(&court.id),
                assignment,
                playing,
            }
        })
        .collect();
    let counters = DebugCounters {
        eligible: queue.len(),
        in_play_players: ctx.in_play().len(),
        recent_players: ctx.recent().len(),
        free_courts: snap.free_courts().len(),
        locked_courts: snap.courts.iter().filter(|c| snap.locked.contains(&c.id)).count(),
        ghosts_cleared: reconciled.ghosts_cleared,
        invalid_cleared: reconciled.invalid_cleared + reconciled.canceled,
    };
    Ok(ScheduleState {
        stage,
        auto_schedule: snap.config.auto_schedule,
        courts,
        queue,
        upcoming: preview,
        blocked: snap.blocked,
        counters,
    })
}

/// Writes the assignment, the last batch and drops the forced entry. Runs inside the
/// caller's transaction.
fn place<S: ScheduleStore>(
    s: &mut S,
    snap: &Snapshot,
    court: i32,
    m: &PoolMatch,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<CourtAssignment> {
    let stage = snap.stage;
    if s.is_match_active(stage, m.key)? {
        return Err(Error::AlreadyAssigned {});
    }
    let row = s.insert_assignment(&CourtAssignment::new(court, stage, m.key, now))?;
    let mut config = snap.config.clone();
    config.last_batch.push(
        LastBatchEntry {
            key: m.key,
            players: m.players.clone(),
            assigned_at: now,
        },
        settings.recent_window,
    );
    s.save_config(&config, now)?;
    s.remove_forced(stage, m.key)?;
    tracing::info!(%stage, court, match_id = %m.key.id, kind = %m.key.kind, "match assigned");
    Ok(row)
}

/// Puts `key` on `court` by hand.
pub fn assign<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    court: i32,
    key: MatchKey,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<CourtAssignment> {
    reconcile(store, stage, settings, now)?;
    store.transaction(|s| {
        let snap = s.snapshot(stage, settings.recent_window)?;
        snap.court(court).ok_or(Error::NotFound {})?;
        if snap.locked.contains(&court) {
            return Err(Error::CourtLocked { court });
        }
        if let Some(row) = snap.active_on(court) {
            if !row.is_ghost() {
                return Err(Error::CourtBusy { court });
            }
            s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
        }
        let m = snap.find(key).ok_or(Error::NotFound {})?;
        if snap.blocked_keys().contains(&key) {
            return Err(Error::MatchBlocked { key });
        }
        if !m.is_list_eligible() {
            return Err(Error::MatchNotEligible { key });
        }
        if snap.held().contains(&key) {
            return Err(Error::AlreadyAssigned {});
        }
        let ctx = FairnessContext::new(
            &snap.pool,
            &snap.held(),
            &snap.config.last_batch,
            settings.recent_window,
        );
        let players = ctx.players_in_play(m);
        if !players.is_empty() {
            return Err(Error::PlayersInPlay { players });
        }
        place(s, &snap, court, m, settings, now)
    })
}

/// Sends the match on `court` back to the queue. With auto schedule on, the best match that
/// can start right now takes its place; the returned match is not a candidate.
pub fn back_to_queue<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    court: i32,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<QueueReturn> {
    let outcome = store.transaction(|s| {
        let mut snap = s.snapshot(stage, settings.recent_window)?;
        snap.court(court).ok_or(Error::NotFound {})?;
        let Some(row) = snap.active_on(court).cloned() else {
            return Ok(QueueReturn::CourtAlreadyEmpty { court });
        };
        let Some(returned) = row.key() else {
            s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
            return Ok(QueueReturn::CourtAlreadyEmpty { court });
        };
        s.close_assignment(row.id, AssignmentStatus::Canceled, now)?;
        if !snap.config.auto_schedule || snap.locked.contains(&court) {
            return Ok(QueueReturn::Emptied { court, returned });
        }
        snap.active.retain(|a| a.id != row.id);
        let (_, queue) = rank(&snap, settings, Some(returned));
        let Some(entry) = queue.iter().find(|e| e.assignable) else {
            return Ok(QueueReturn::NoNextMatch { court, returned });
        };
        let next = place(s, &snap, court, &entry.item, settings, now)?;
        Ok(QueueReturn::Swapped {
            court,
            returned,
            next,
        })
    })?;
    tracing::info!(%stage, court, outcome = ?outcome, "match sent back to queue");
    Ok(outcome)
}

/// Clears `court` once its match has a final result, then refills when auto schedule is on.
pub fn mark_completed<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    court: i32,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<CompletionReport> {
    let (cleared, auto) = store.transaction(|s| {
        let snap = s.snapshot(stage, settings.recent_window)?;
        snap.court(court).ok_or(Error::NotFound {})?;
        let row = snap
            .active_on(court)
            .cloned()
            .ok_or(Error::CourtEmpty { court })?;
        let Some(key) = row.key() else {
            s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
            return Err(Error::CourtEmpty { court });
        };
        let finalized = snap.find(key).is_some_and(PoolMatch::is_finalized);
        if !finalized {
            return Err(Error::ResultNotFinal { key });
        }
        s.close_assignment(row.id, AssignmentStatus::Cleared, now)?;
        let cleared = CourtAssignment {
            status: AssignmentStatus::Cleared,
            cleared_at: Some(now),
            ..row
        };
        Ok((cleared, snap.config.auto_schedule))
    })?;
    tracing::info!(%stage, court, match_id = ?cleared.key().map(|k| k.id), "court cleared");
    let fill = if auto {
        Some(fill(store, stage, settings, now)?)
    } else {
        None
    };
    Ok(CompletionReport { cleared, fill })
}

/// Locks or unlocks `court` for `stage`. A match already playing there keeps playing.
pub fn set_court_lock<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    court: i32,
    locked: bool,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<Option<FillReport>> {
    let auto = store.transaction(|s| {
        let snap = s.snapshot(stage, settings.recent_window)?;
        snap.court(court).ok_or(Error::NotFound {})?;
        s.set_court_lock(court, stage, locked, now)?;
        Ok(snap.config.auto_schedule)
    })?;
    tracing::info!(%stage, court, locked, "court lock changed");
    if !locked && auto {
        fill(store, stage, settings, now).map(Some)
    } else {
        Ok(None)
    }
}

/// Moves `key` to the end of the manual priority list.
pub fn force<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    key: MatchKey,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<()> {
    reconcile(store, stage, settings, now)?;
    store.transaction(|s| {
        let snap = s.snapshot(stage, settings.recent_window)?;
        let m = snap.find(key).ok_or(Error::NotFound {})?;
        if snap.blocked_keys().contains(&key) {
            return Err(Error::MatchBlocked { key });
        }
        if !m.is_list_eligible() {
            return Err(Error::MatchNotEligible { key });
        }
        if snap.held().contains(&key) {
            return Err(Error::AlreadyAssigned {});
        }
        s.add_forced(stage, key, now)
    })?;
    tracing::info!(%stage, match_id = %key.id, kind = %key.kind, "match forced");
    Ok(())
}

pub fn unforce<S: ScheduleStore>(store: &mut S, stage: Stage, key: MatchKey) -> Result<()> {
    store.remove_forced(stage, key)?;
    tracing::info!(%stage, match_id = %key.id, kind = %key.kind, "match unforced");
    Ok(())
}

fn fill_if_auto<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<Option<FillReport>> {
    if store.snapshot(stage, settings.recent_window)?.config.auto_schedule {
        fill(store, stage, settings, now).map(Some)
    } else {
        Ok(None)
    }
}

/// Takes `key` out of scheduling everywhere, pulling it off any court it is on.
pub fn block<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    key: MatchKey,
    reason: &str,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<BlockReport> {
    let canceled = store.transaction(|s| {
        s.add_block(key, reason, now)?;
        let rows = s.active_for_match(key)?;
        for row in &rows {
            s.close_assignment(row.id, AssignmentStatus::Canceled, now)?;
        }
        for each in Stage::ALL {
            s.remove_forced(each, key)?;
        }
        Ok(rows)
    })?;
    tracing::info!(%stage, match_id = %key.id, kind = %key.kind, canceled = canceled.len(), reason, "match blocked");

    let mut stages: BTreeSet<Stage> = canceled.iter().map(|row| row.stage).collect();
    stages.insert(stage);
    let mut fills = Vec::new();
    for each in stages {
        fills.extend(fill_if_auto(store, each, settings, now)?);
    }
    let canceled = canceled
        .into_iter()
        .map(|row| CourtAssignment {
            status: AssignmentStatus::Canceled,
            cleared_at: Some(now),
            ..row
        })
        .collect();
    Ok(BlockReport {
        key,
        canceled,
        fills,
    })
}

pub fn unblock<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    key: MatchKey,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<Option<FillReport>> {
    store.remove_block(key)?;
    tracing::info!(%stage, match_id = %key.id, kind = %key.kind, "match unblocked");
    fill_if_auto(store, stage, settings, now)
}

/// Turns auto schedule on or off. Turning it on fills the free courts straight away.
pub fn set_auto<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    enabled: bool,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<Option<FillReport>> {
    store.transaction(|s| {
        let mut config = s.snapshot(stage, settings.recent_window)?.config;
        config.auto_schedule = enabled;
        s.save_config(&config, now)
    })?;
    tracing::info!(%stage, enabled, "auto schedule changed");
    if enabled {
        fill(store, stage, settings, now).map(Some)
    } else {
        Ok(None)
    }
}

/// Fills free courts one at a time, best assignable match first, re-reading state on every
/// pass.
pub fn fill<S: ScheduleStore>(
    store: &mut S,
    stage: Stage,
    settings: &SysSettings,
    now: NaiveDateTime,
) -> Result<FillReport> {
    let mut report = FillReport {
        stage,
        passes: 0,
        assigned: Vec::new(),
        ghosts_cleared: 0,
        invalid_cleared: 0,
        conflicts: 0,
        stop: FillStop::PassLimit,
    };
    for pass in 1..=settings.fill_max_passes.max(1) {
        report.passes = pass;
        let reconciled = reconcile(store, stage, settings, now)?;
        report.ghosts_cleared += reconciled.ghosts_cleared;
        report.invalid_cleared += reconciled.invalid_cleared + reconciled.canceled;

        let snap = store.snapshot(stage, settings.recent_window)?;
        let Some(court) = snap.free_courts().first().map(|c| c.id) else {
            report.stop = FillStop::NoFreeCourt;
            break;
        };
        let (_, queue) = rank(&snap, settings, None);
        if queue.is_empty() {
            report.stop = FillStop::NoEligibleMatch;
            break;
        }
        let Some(entry) = queue.iter().find(|e| e.assignable) else {
            report.stop = FillStop::NothingAssignable;
            break;
        };
        match store.transaction(|s| place(s, &snap, court, &entry.item, settings, now)) {
            Ok(row) => report.assigned.push(row),
            Err(Error::AlreadyAssigned {}) => {
                report.conflicts += 1;
                tracing::warn!(%stage, court, match_id = %entry.key().id, "lost assignment race, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(
        %stage,
        passes = report.passes,
        assigned = report.assigned.len(),
        conflicts = report.conflicts,
        stop = ?report.stop,
        "fill finished"
    );
    Ok(report)
}

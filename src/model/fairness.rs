/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Which pool matches may be queued, and how rested their players are.
use crate::model::kinds::MatchKey;
use crate::model::pool::PoolMatch;
use chrono::NaiveDateTime;
use schemars::JsonSchema;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// # Last Batch Entry
/// One recently assigned match, kept for rest lookback.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct LastBatchEntry {
    pub key: MatchKey,
    pub players: Vec<Uuid>,
    pub assigned_at: NaiveDateTime,
}

/// # Last Batch
/// Rolling window of recent assignments, newest first.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Default)]
pub struct LastBatch {
    pub entries: Vec<LastBatchEntry>,
}

impl LastBatch {
    /// Rebuilds the window from stored rows given as `(position, entry)`.
    ///
    /// Rows are ordered by position; a repeated match key means the window was written by two
    /// racing writers, in which case only the first occurrence is kept.
    pub fn from_rows(mut rows: Vec<(i32, LastBatchEntry)>, window: usize) -> LastBatch {
        rows.sort_by_key(|(position, _)| *position);
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(rows.len());
        for (_, entry) in rows {
            if seen.insert(entry.key) {
                entries.push(entry);
            }
        }
        if entries.len() > window {
            tracing::warn!(
                stored = entries.len(),
                window,
                "last batch longer than window, truncating"
            );
            entries.truncate(window);
        }
        LastBatch { entries }
    }

    pub fn push(&mut self, entry: LastBatchEntry, window: usize) {
        self.entries.retain(|e| e.key != entry.key);
        self.entries.insert(0, entry);
        self.entries.truncate(window);
    }
}

/// Everything the rest score depends on. Rebuilt on every query.
#[derive(Debug, Clone, Default)]
pub struct FairnessContext {
    in_play: HashSet<Uuid>,
    recent: HashSet<Uuid>,
}

impl FairnessContext {
    /// `held` are the matches of ACTIVE assignments in the stage.
    pub fn new(
        pool: &[PoolMatch],
        held: &HashSet<MatchKey>,
        last_batch: &LastBatch,
        recent_window: usize,
    ) -> Self {
        let by_key: HashMap<MatchKey, &PoolMatch> = pool.iter().map(|m| (m.key, m)).collect();
        let in_play = held
            .iter()
            .filter_map(|key| by_key.get(key))
            .flat_map(|m| m.players.iter().copied())
            .collect();
        FairnessContext {
            in_play,
            recent: recent_players(pool, held, last_batch, recent_window),
        }
    }

    pub fn in_play(&self) -> &HashSet<Uuid> {
        &self.in_play
    }

    pub fn recent(&self) -> &HashSet<Uuid> {
        &self.recent
    }

    /// Count of the match's players who are neither on court nor just off it.
    pub fn rest_score(&self, m: &PoolMatch) -> u8 {
        m.players
            .iter()
            .filter(|p| !self.in_play.contains(p) && !self.recent.contains(p))
            .count() as u8
    }

    /// No player of `m` is on court right now.
    pub fn is_assignable(&self, m: &PoolMatch) -> bool {
        !m.players.iter().any(|p| self.in_play.contains(p))
    }

    pub fn players_in_play(&self, m: &PoolMatch) -> Vec<Uuid> {
        m.players
            .iter()
            .filter(|p| self.in_play.contains(p))
            .copied()
            .collect()
    }

    /// Marks the players of a freshly assigned match as on court.
    pub fn occupy(&mut self, m: &PoolMatch) {
        self.in_play.extend(m.players.iter().copied());
    }
}

/// Players of the last `window` matches completed in the stage.
///
/// While the stage has fewer completed matches than the window, the lookback continues into the
/// last batch (newest first), skipping matches that are still on court.
fn recent_players(
    pool: &[PoolMatch],
    held: &HashSet<MatchKey>,
    last_batch: &LastBatch,
    window: usize,
) -> HashSet<Uuid> {
    let mut completed: Vec<&PoolMatch> = pool
        .iter()
        .filter(|m| m.completed_at.is_some())
        .collect();
    completed.sort_by(|a, b| {
        b.completed_at
            .cmp(&a.completed_at)
            .then_with(|| a.key.id.cmp(&b.key.id))
    });
    completed.truncate(window);

    let mut counted: HashSet<MatchKey> = completed.iter().map(|m| m.key).collect();
    let mut players: HashSet<Uuid> = completed
        .iter()
        .flat_map(|m| m.players.iter().copied())
        .collect();
    for entry in &last_batch.entries {
        if counted.len() >= window {
            break;
        }
        if held.contains(&entry.key) || !counted.insert(entry.key) {
            continue;
        }
        players.extend(entry.players.iter().copied());
    }
    players
}

/// List-eligible matches that are neither on court nor blocked.
pub fn eligible<'a>(
    pool: &'a [PoolMatch],
    held: &HashSet<MatchKey>,
    blocked: &HashSet<MatchKey>,
) -> Vec<&'a PoolMatch> {
    pool.iter()
        .filter(|m| m.is_list_eligible() && !held.contains(&m.key) && !blocked.contains(&m.key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds::MatchStatus;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 4)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn player(n: u128) -> Uuid {
        Uuid::from_u128(1000 + n)
    }

    fn doubles(id: u128, players: [u128; 4]) -> PoolMatch {
        PoolMatch {
            key: MatchKey::group(Uuid::from_u128(id)),
            status: MatchStatus::Scheduled,
            home: Some(Uuid::from_u128(100 + id)),
            away: Some(Uuid::from_u128(200 + id)),
            winner: None,
            players: players.iter().map(|&p| player(p)).collect(),
            published: true,
            position: None,
            completed_at: None,
        }
    }

    fn done(mut m: PoolMatch, minute: u32) -> PoolMatch {
        m.status = MatchStatus::Completed;
        m.winner = m.home;
        m.completed_at = Some(at(minute));
        m
    }

    #[test]
    fn test_rest_score_counts_fresh_players() {
        let on_court = doubles(1, [1, 2, 3, 4]);
        let finished = done(doubles(2, [5, 6, 7, 8]), 1);
        let candidate = doubles(3, [1, 5, 9, 10]);
        let fresh = doubles(4, [11, 12, 13, 14]);
        let pool = vec![on_court.clone(), finished, candidate.clone(), fresh.clone()];
        let held = HashSet::from([on_court.key]);

        let ctx = FairnessContext::new(&pool, &held, &LastBatch::default(), 5);
        assert_eq!(ctx.rest_score(&candidate), 2);
        assert_eq!(ctx.rest_score(&fresh), 4);
        assert!(!ctx.is_assignable(&candidate));
        assert_eq!(ctx.players_in_play(&candidate), vec![player(1)]);
        for m in &pool {
            assert!(ctx.rest_score(m) as usize <= m.players.len());
        }
    }

    #[test]
    fn test_recent_window_keeps_latest_completions() {
        let mut pool = Vec::new();
        for i in 0..7u32 {
            let base = i as u128 * 4;
            pool.push(done(doubles(i as u128 + 1, [base, base + 1, base + 2, base + 3]), i));
        }
        let ctx = FairnessContext::new(&pool, &HashSet::new(), &LastBatch::default(), 5);
        // Matches finished at minutes 0 and 1 fell out of the window.
        assert!(!ctx.recent().contains(&player(0)));
        assert!(!ctx.recent().contains(&player(7)));
        assert!(ctx.recent().contains(&player(8)));
        assert!(ctx.recent().contains(&player(27)));
        assert_eq!(ctx.recent().len(), 20);
    }

    #[test]
    fn test_last_batch_fills_short_history() {
        let finished = done(doubles(1, [1, 2, 3, 4]), 0);
        let still_playing = doubles(2, [5, 6, 7, 8]);
        let pool = vec![finished, still_playing.clone()];
        let mut batch = LastBatch::default();
        batch.push(
            LastBatchEntry {
                key: MatchKey::group(Uuid::from_u128(99)),
                players: vec![player(20)],
                assigned_at: at(3),
            },
            5,
        );
        batch.push(
            LastBatchEntry {
                key: still_playing.key,
                players: still_playing.players.clone(),
                assigned_at: at(4),
            },
            5,
        );
        let held = HashSet::from([still_playing.key]);
        let ctx = FairnessContext::new(&pool, &held, &batch, 5);
        assert!(ctx.recent().contains(&player(1)));
        assert!(ctx.recent().contains(&player(20)));
        // On court counts as in play, not as recent.
        assert!(!ctx.recent().contains(&player(5)));
        assert!(ctx.in_play().contains(&player(5)));
    }

    #[test]
    fn test_last_batch_from_rows_dedupes_and_truncates() {
        let entry = |id: u128, minute| LastBatchEntry {
            key: MatchKey::group(Uuid::from_u128(id)),
            players: vec![player(id)],
            assigned_at: at(minute),
        };
        let rows = vec![(2, entry(3, 1)), (0, entry(1, 3)), (1, entry(1, 2)), (3, entry(4, 0))];
        let batch = LastBatch::from_rows(rows, 2);
        let ids: Vec<Uuid> = batch.entries.iter().map(|e| e.key.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
    }

    #[test]
    fn test_eligibility() {
        let ok = doubles(1, [1, 2, 3, 4]);
        let mut half = doubles(2, [5, 6, 7, 8]);
        half.away = None;
        let mut hidden = doubles(3, [9, 10, 11, 12]);
        hidden.published = false;
        let finished = done(doubles(4, [13, 14, 15, 16]), 0);
        let held = doubles(5, [17, 18, 19, 20]);
        let blocked = doubles(6, [21, 22, 23, 24]);
        let pool = vec![ok.clone(), half, hidden, finished, held.clone(), blocked.clone()];

        let list = eligible(&pool, &HashSet::from([held.key]), &HashSet::from([blocked.key]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].key, ok.key);
    }
}

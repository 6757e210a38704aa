/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::model::fairness::{eligible, FairnessContext};
use crate::model::kinds::{MatchKey, MatchKind};
use crate::model::pool::PoolMatch;
use schemars::JsonSchema;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// # Queue Entry
/// An eligible match with the values it was ordered by.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct QueueEntry {
    #[serde(rename = "match")]
    pub item: PoolMatch,
    pub rest: u8,
    /// Zero based manual rank, absent when the match is not forced
    pub forced_rank: Option<usize>,
    /// No player of the match is on court right now
    pub assignable: bool,
}

impl QueueEntry {
    pub fn key(&self) -> MatchKey {
        self.item.key
    }
}

fn kind_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::Group => 0,
        MatchKind::Knockout => 1,
    }
}

/// Total order of the queue. Two distinct matches never compare equal.
pub fn compare(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    let forced = match (a.forced_rank, b.forced_rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    forced
        .then_with(|| kind_rank(a.item.key.kind).cmp(&kind_rank(b.item.key.kind)))
        .then_with(|| b.rest.cmp(&a.rest))
        .then_with(|| match (&a.item.position, &b.item.position) {
            // B plays its rounds ahead of A so Series A losers have somewhere to land
            (Some(x), Some(y)) => x
                .round
                .cmp(&y.round)
                .then_with(|| y.series.cmp(&x.series))
                .then_with(|| x.match_no.cmp(&y.match_no)),
            _ => Ordering::Equal,
        })
        .then_with(|| a.item.key.id.cmp(&b.item.key.id))
}

/// Builds the ordered queue for one stage.
///
/// `forced` lists forced matches in insertion order; stale entries (not eligible) are
/// skipped here and pruned by the scheduler.
pub fn build_queue(
    pool: &[PoolMatch],
    held: &HashSet<MatchKey>,
    blocked: &HashSet<MatchKey>,
    forced: &[MatchKey],
    ctx: &FairnessContext,
) -> Vec<QueueEntry> {
    let ranks: HashMap<MatchKey, usize> = forced
        .iter()
        .enumerate()
        .map(|(rank, key)| (*key, rank))
        .collect();
    let mut queue: Vec<QueueEntry> = eligible(pool, held, blocked)
        .into_iter()
        .map(|m| QueueEntry {
            rest: ctx.rest_score(m),
            forced_rank: ranks.get(&m.key).copied(),
            assignable: ctx.is_assignable(m),
            item: m.clone(),
        })
        .collect();
    queue.sort_by(compare);
    queue
}

/// Preview of what plays next, at most `limit` long, no two entries sharing a player.
///
/// Forced matches that can start now come first, then forced ones still waiting on a
/// player, then the same two groups of unforced matches. Queue order holds inside each group.
pub fn upcoming(queue: &[QueueEntry], limit: usize) -> Vec<QueueEntry> {
    let passes: [(bool, bool); 4] = [(true, true), (true, false), (false, true), (false, false)];
    let mut picked: Vec<&QueueEntry> = Vec::new();
    for (forced, assignable) in passes {
        for entry in queue {
            if picked.len() >= limit {
                break;
            }
            if entry.forced_rank.is_some() != forced || entry.assignable != assignable {
                continue;
            }
            if picked.iter().any(|p| p.item.shares_player_with(&entry.item)) {
                continue;
            }
            picked.push(entry);
        }
    }
    picked.into_iter().cloned().collect()
}

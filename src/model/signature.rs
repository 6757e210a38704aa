/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Stable fingerprints of what is on court and what comes next, so displays can poll cheaply
//! and only redraw what changed.
use crate::model::court::ScheduleState;
use crate::model::kinds::{MatchKey, Stage};
use schemars::JsonSchema;
use sha2::{Digest, Sha256};

/// # Change Signature
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignature {
    pub stage: Stage,
    /// Hash of the (court, match) pairs currently playing
    pub assignment: String,
    /// Hash of the upcoming order
    pub upcoming: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Assignment,
    Upcoming,
    Both,
}

fn digest(lines: impl Iterator<Item = String>) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

impl ChangeSignature {
    pub fn compute(stage: Stage, playing: &[(i32, MatchKey)], upcoming: &[MatchKey]) -> Self {
        let mut playing = playing.to_vec();
        playing.sort_by_key(|(court, key)| (*court, key.kind, key.id));
        ChangeSignature {
            stage,
            assignment: digest(playing.into_iter().map(|(court, key)| format!("{court}={key}"))),
            upcoming: digest(upcoming.iter().map(MatchKey::to_string)),
        }
    }

    pub fn of(state: &ScheduleState) -> Self {
        let playing: Vec<(i32, MatchKey)> = state
            .courts
            .iter()
            .filter_map(|view| {
                let key = view.assignment.as_ref()?.key()?;
                Some((view.court.id, key))
            })
            .collect();
        let upcoming: Vec<MatchKey> = state.upcoming.iter().map(|e| e.key()).collect();
        ChangeSignature::compute(state.stage, &playing, &upcoming)
    }
}

/// What changed between two signatures of the same stage, if anything.
pub fn diff(prev: &ChangeSignature, next: &ChangeSignature) -> Option<ChangeKind> {
    match (prev.assignment != next.assignment, prev.upcoming != next.upcoming) {
        (true, true) => Some(ChangeKind::Both),
        (true, false) => Some(ChangeKind::Assignment),
        (false, true) => Some(ChangeKind::Upcoming),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key(n: u128) -> MatchKey {
        MatchKey::group(Uuid::from_u128(n))
    }

    #[test]
    fn test_playing_order_does_not_matter() {
        let a = ChangeSignature::compute(Stage::Group, &[(1, key(1)), (2, key(2))], &[key(3)]);
        let b = ChangeSignature::compute(Stage::Group, &[(2, key(2)), (1, key(1))], &[key(3)]);
        assert_eq!(a, b);
        assert_eq!(a.assignment.len(), 64);
        assert_eq!(diff(&a, &b), None);
    }

    #[test]
    fn test_change_kinds() {
        let base = ChangeSignature::compute(Stage::Group, &[(1, key(1))], &[key(2), key(3)]);
        let swapped = ChangeSignature::compute(Stage::Group, &[(1, key(1))], &[key(3), key(2)]);
        let moved = ChangeSignature::compute(Stage::Group, &[(2, key(1))], &[key(2), key(3)]);
        let both = ChangeSignature::compute(Stage::Group, &[(1, key(2))], &[key(3)]);
        assert_eq!(diff(&base, &swapped), Some(ChangeKind::Upcoming));
        assert_eq!(diff(&base, &moved), Some(ChangeKind::Assignment));
        assert_eq!(diff(&base, &both), Some(ChangeKind::Both));
    }
}

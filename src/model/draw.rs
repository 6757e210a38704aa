/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Persisted random draws for exact ties.
//!
//! A tie between the same candidates in the same context is only ever drawn once: the first
//! resolution is stored under a key derived from the context and the sorted candidate ids,
//! and every later lookup gets the stored order back.
use crate::error::{MapRre, Result};
use crate::model::court::PgStore;
use crate::schema::random_draw;
use diesel::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawKey(String);

impl DrawKey {
    pub fn new(scope: &[&str], candidates: &[Uuid]) -> DrawKey {
        let mut ids: Vec<Uuid> = candidates.to_vec();
        ids.sort();
        ids.dedup();
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        DrawKey(format!("{}|{}", scope.join("|"), ids.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DrawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait DrawStore {
    /// Stores `proposed` under `key` unless a draw is already stored, then returns whatever
    /// is stored. Concurrent callers all see the first writer's order.
    fn fetch_or_insert(&mut self, key: &DrawKey, proposed: &[Uuid]) -> Result<Vec<Uuid>>;
}

impl DrawStore for PgStore<'_> {
    fn fetch_or_insert(&mut self, key: &DrawKey, proposed: &[Uuid]) -> Result<Vec<Uuid>> {
        diesel::insert_into(random_draw::table)
            .values((
                random_draw::draw_key.eq(key.as_str()),
                random_draw::draw_order.eq(proposed.to_vec()),
            ))
            .on_conflict(random_draw::draw_key)
            .do_nothing()
            .execute(self.conn)?;
        random_draw::table
            .filter(random_draw::draw_key.eq(key.as_str()))
            .select(random_draw::draw_order)
            .first::<Vec<Uuid>>(self.conn)
            .map_rre()
    }
}

/// Orders tied `candidates`, drawing at random the first time this tie is seen.
///
/// A stored order that is not a permutation of the candidates is ignored with a warning and
/// the candidates come back sorted by id.
pub fn resolve<D: DrawStore + ?Sized, R: Rng + ?Sized>(
    store: &mut D,
    scope: &[&str],
    candidates: &[Uuid],
    rng: &mut R,
) -> Result<Vec<Uuid>> {
    let mut sorted = candidates.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() < 2 {
        return Ok(sorted);
    }
    let key = DrawKey::new(scope, &sorted);
    let mut proposed = sorted.clone();
    proposed.shuffle(rng);
    let stored = store.fetch_or_insert(&key, &proposed)?;
    if is_permutation(&stored, &sorted) {
        Ok(stored)
    } else {
        tracing::warn!(draw_key = %key, stored = ?stored, "stored draw does not match candidates, using id order");
        Ok(sorted)
    }
}

fn is_permutation(stored: &[Uuid], sorted: &[Uuid]) -> bool {
    stored.len() == sorted.len() && stored.iter().copied().collect::<BTreeSet<_>>() == sorted.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Draws(HashMap<DrawKey, Vec<Uuid>>);

    impl DrawStore for Draws {
        fn fetch_or_insert(&mut self, key: &DrawKey, proposed: &[Uuid]) -> Result<Vec<Uuid>> {
            Ok(self.0.entry(key.clone()).or_insert_with(|| proposed.to_vec()).clone())
        }
    }

    fn ids(n: u128) -> Vec<Uuid> {
        (1..=n).map(Uuid::from_u128).collect()
    }

    #[test]
    fn test_key_ignores_candidate_order() {
        let mut reversed = ids(3);
        reversed.reverse();
        assert_eq!(DrawKey::new(&["MD", "A"], &ids(3)), DrawKey::new(&["MD", "A"], &reversed));
        assert_ne!(DrawKey::new(&["MD", "A"], &ids(3)), DrawKey::new(&["MD", "B"], &ids(3)));
    }

    #[test]
    fn test_draw_is_resolved_once() {
        let mut store = Draws::default();
        let first = resolve(&mut store, &["MD"], &ids(6), &mut ChaCha12Rng::seed_from_u64(1)).unwrap();
        for seed in 2..20 {
            let mut shuffled = ids(6);
            shuffled.shuffle(&mut ChaCha12Rng::seed_from_u64(seed));
            let again = resolve(&mut store, &["MD"], &shuffled, &mut ChaCha12Rng::seed_from_u64(seed)).unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(store.0.len(), 1);
    }

    #[test]
    fn test_corrupt_draw_falls_back_to_id_order() {
        let mut store = Draws::default();
        let key = DrawKey::new(&["MD"], &ids(3));
        store.0.insert(key, vec![Uuid::from_u128(1), Uuid::from_u128(9)]);
        let order = resolve(&mut store, &["MD"], &ids(3), &mut ChaCha12Rng::seed_from_u64(0)).unwrap();
        assert_eq!(order, ids(3));
    }

    #[test]
    fn test_single_candidate_needs_no_draw() {
        let mut store = Draws::default();
        let order = resolve(&mut store, &["MD"], &ids(1), &mut ChaCha12Rng::seed_from_u64(0)).unwrap();
        assert_eq!(order, ids(1));
        assert!(store.0.is_empty());
    }
}

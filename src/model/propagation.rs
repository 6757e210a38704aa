/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Moving results through a category's knockout matches.
//!
//! Everything here works on an in-memory [`Bracket`]; loading and saving are the caller's
//! business, and nothing is saved when a pass fails.
use crate::error::{Error, Result};
use crate::model::kinds::{MatchKey, MatchStatus, Series, Slot};
use crate::model::score::{Game, ScoringRules, Side};
use chrono::NaiveDateTime;
use schemars::JsonSchema;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct BracketMatch {
    pub id: Uuid,
    pub series: Series,
    pub round: i32,
    pub match_no: i32,
    pub status: MatchStatus,
    pub home: Option<Uuid>,
    pub away: Option<Uuid>,
    pub winner: Option<Uuid>,
    pub next: Option<(Uuid, Slot)>,
    /// Second chance seat for the loser, only set on Series A first round matches
    pub loser_next: Option<(Uuid, Slot)>,
    pub games: Vec<Game>,
    pub completed_at: Option<NaiveDateTime>,
}

impl BracketMatch {
    pub fn seat(&self, slot: Slot) -> Option<Uuid> {
        match slot {
            Slot::Home => self.home,
            Slot::Away => self.away,
        }
    }

    fn seat_mut(&mut self, slot: Slot) -> &mut Option<Uuid> {
        match slot {
            Slot::Home => &mut self.home,
            Slot::Away => &mut self.away,
        }
    }

    pub fn loser(&self) -> Option<Uuid> {
        let winner = self.winner?;
        if self.home == Some(winner) {
            self.away
        } else if self.away == Some(winner) {
            self.home
        } else {
            None
        }
    }

    fn is_undecided(&self) -> bool {
        self.status == MatchStatus::Scheduled && self.winner.is_none()
    }

    fn has_team(&self, team: Uuid) -> bool {
        self.home == Some(team) || self.away == Some(team)
    }
}

/// # Propagation Report
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Default)]
pub struct PropagationReport {
    pub passes: usize,
    /// False when the pass limit was hit before a pass came back clean
    pub converged: bool,
    /// Every match written to, in id order
    pub changed: Vec<Uuid>,
    /// Matches reset by cascades
    pub resets: usize,
}

#[derive(Debug, Clone)]
pub struct Bracket {
    matches: Vec<BracketMatch>,
    index: HashMap<Uuid, usize>,
    dirty: BTreeSet<Uuid>,
    resets: usize,
}

impl Bracket {
    pub fn new(mut matches: Vec<BracketMatch>) -> Bracket {
        matches.sort_by_key(|m| (m.series, m.round, m.match_no));
        let index = matches.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        Bracket {
            matches,
            index,
            dirty: BTreeSet::new(),
            resets: 0,
        }
    }

    pub fn matches(&self) -> &[BracketMatch] {
        &self.matches
    }

    pub fn get(&self, id: Uuid) -> Option<&BracketMatch> {
        self.index.get(&id).map(|&i| &self.matches[i])
    }

    fn at(&self, id: Uuid) -> Result<usize> {
        self.index.get(&id).copied().ok_or(Error::NotFound {})
    }

    /// Matches modified since the bracket was loaded.
    pub fn dirty(&self) -> impl Iterator<Item = &BracketMatch> {
        self.dirty.iter().filter_map(move |id| self.get(*id))
    }

    pub fn record_game(&mut self, id: Uuid, game: Game, rules: &ScoringRules) -> Result<()> {
        let i = self.at(id)?;
        let m = &mut self.matches[i];
        let key = MatchKey::knockout(id);
        if m.home.is_none() || m.away.is_none() {
            return Err(Error::MatchIncomplete { key });
        }
        if !m.is_undecided() {
            return Err(Error::MatchDecided { key });
        }
        rules.check_game(key, &game)?;
        m.games.push(game);
        self.dirty.insert(id);
        Ok(())
    }

    pub fn walkover(&mut self, id: Uuid, side: Side, now: NaiveDateTime) -> Result<()> {
        let i = self.at(id)?;
        let m = &mut self.matches[i];
        let key = MatchKey::knockout(id);
        if !m.is_undecided() {
            return Err(Error::MatchDecided { key });
        }
        let winner = side.pick(m.home, m.away).ok_or(Error::MatchIncomplete { key })?;
        if m.home.is_none() || m.away.is_none() {
            return Err(Error::MatchIncomplete { key });
        }
        m.status = MatchStatus::Walkover;
        m.winner = Some(winner);
        m.games.clear();
        m.completed_at = Some(now);
        self.dirty.insert(id);
        Ok(())
    }

    /// Takes back the last game, or the walkover, and unwinds whatever the result had
    /// moved downstream.
    pub fn undo(&mut self, id: Uuid, rules: &ScoringRules) -> Result<()> {
        let i = self.at(id)?;
        if self.matches[i].status == MatchStatus::Walkover {
            self.reset(id, true);
            return Ok(());
        }
        let m = &mut self.matches[i];
        if m.games.pop().is_none() {
            return Err(Error::NothingToUndo {
                key: MatchKey::knockout(id),
            });
        }
        let still_won = rules.match_winner(&m.games).is_some();
        self.dirty.insert(id);
        if m.winner.is_some() && !still_won {
            self.reset(id, false);
        }
        Ok(())
    }

    /// Clears the result of `start` and of everything its teams reached downstream.
    ///
    /// Downstream matches lose their games as well, since they were played by someone who
    /// should not have been there.
    fn reset(&mut self, start: Uuid, discard_games: bool) {
        let mut worklist = vec![(start, discard_games)];
        let mut seen = HashSet::new();
        while let Some((id, discard)) = worklist.pop() {
            let Some(&i) = self.index.get(&id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            let (winner, loser) = (self.matches[i].winner, self.matches[i].loser());
            let (next, loser_next) = (self.matches[i].next, self.matches[i].loser_next);
            {
                let m = &mut self.matches[i];
                if discard {
                    m.games.clear();
                }
                m.winner = None;
                m.status = MatchStatus::Scheduled;
                m.completed_at = None;
            }
            self.dirty.insert(id);
            self.resets += 1;
            tracing::debug!(match_id = %id, discard, "knockout match reset");

            for (team, link) in [(winner, next), (loser, loser_next)] {
                if let (Some(team), Some((target, slot))) = (team, link) {
                    if let Some(&t) = self.index.get(&target) {
                        let seat = self.matches[t].seat_mut(slot);
                        if *seat == Some(team) {
                            *seat = None;
                            self.dirty.insert(target);
                            worklist.push((target, true));
                        }
                    }
                }
            }
        }
    }

    /// Places `team` in `slot` of `target`, resetting the target if it was played by
    /// somebody else.
    fn seat(&mut self, target: Uuid, slot: Slot, team: Uuid) -> Result<bool> {
        let t = self.at(target)?;
        match self.matches[t].seat(slot) {
            Some(current) if current == team => Ok(false),
            current => {
                if current.is_some() {
                    self.reset(target, true);
                }
                *self.matches[t].seat_mut(slot) = Some(team);
                self.dirty.insert(target);
                Ok(true)
            }
        }
    }

    fn seat_loser(&mut self, source: usize, target: Uuid, slot: Slot, loser: Uuid) -> Result<bool> {
        let t = self.at(target)?;
        let target_round = (self.matches[t].series, self.matches[t].round);
        if let Some(elsewhere) = self.matches.iter().find(|m| {
            m.id != target && (m.series, m.round) == target_round && m.has_team(loser)
        }) {
            return Err(Error::SecondChanceConflict {
                match_id: elsewhere.id,
                team: loser,
                occupant: Some(loser),
            });
        }
        match self.matches[t].seat(slot) {
            Some(current) if current == loser => Ok(false),
            // A stale loser of the same source match may be swapped out.
            Some(current) if !self.matches[source].has_team(current) => {
                Err(Error::SecondChanceConflict {
                    match_id: target,
                    team: loser,
                    occupant: Some(current),
                })
            }
            _ => self.seat(target, slot, loser),
        }
    }

    fn pass(&mut self, rules: &ScoringRules, now: NaiveDateTime) -> Result<bool> {
        let mut changed = false;
        for i in 0..self.matches.len() {
            let m = &self.matches[i];
            if m.status != MatchStatus::Walkover {
                let derived = rules.match_winner(&m.games).and_then(|side| side.pick(m.home, m.away));
                match (m.winner, derived) {
                    (None, Some(winner)) => {
                        let id = m.id;
                        let m = &mut self.matches[i];
                        m.winner = Some(winner);
                        m.status = MatchStatus::Completed;
                        m.completed_at = Some(now);
                        self.dirty.insert(id);
                        changed = true;
                    }
                    (Some(stored), derived) if derived != Some(stored) => {
                        return Err(Error::WinnerMismatch {
                            match_id: m.id,
                            stored: Some(stored),
                            derived,
                        });
                    }
                    _ => {}
                }
            }

            let m = &self.matches[i];
            let (winner, loser) = (m.winner, m.loser());
            let (next, loser_next) = (m.next, m.loser_next);
            if let (Some(winner), Some((target, slot))) = (winner, next) {
                changed |= self.seat(target, slot, winner)?;
            }
            if let (Some(loser), Some((target, slot))) = (loser, loser_next) {
                changed |= self.seat_loser(i, target, slot, loser)?;
            }
        }
        Ok(changed)
    }

    /// Repeats passes until one changes nothing, at most `max_passes` times.
    pub fn run(
        &mut self,
        rules: &ScoringRules,
        max_passes: usize,
        now: NaiveDateTime,
    ) -> Result<PropagationReport> {
        let mut report = PropagationReport::default();
        for pass in 1..=max_passes.max(1) {
            report.passes = pass;
            if !self.pass(rules, now)? {
                report.converged = true;
                break;
            }
        }
        if !report.converged {
            tracing::warn!(passes = report.passes, "propagation hit the pass limit");
        }
        report.changed = self.dirty.iter().copied().collect();
        report.resets = self.resets;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kinds::ScoringMode;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    fn single() -> ScoringRules {
        ScoringRules {
            mode: ScoringMode::SingleGame,
            ..ScoringRules::default()
        }
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn team(n: u128) -> Option<Uuid> {
        Some(Uuid::from_u128(900 + n))
    }

    fn m(n: u128, series: Series, round: i32, match_no: i32, next: Option<(u128, Slot)>) -> BracketMatch {
        BracketMatch {
            id: id(n),
            series,
            round,
            match_no,
            status: MatchStatus::Scheduled,
            home: None,
            away: None,
            winner: None,
            next: next.map(|(n, s)| (id(n), s)),
            loser_next: None,
            games: Vec::new(),
            completed_at: None,
        }
    }

    /// Four team Series A: semis 1 and 2 feed final 3.
    fn four_team() -> Bracket {
        let mut semi1 = m(1, Series::A, 1, 1, Some((3, Slot::Home)));
        semi1.home = team(1);
        semi1.away = team(4);
        let mut semi2 = m(2, Series::A, 1, 2, Some((3, Slot::Away)));
        semi2.home = team(2);
        semi2.away = team(3);
        Bracket::new(vec![m(3, Series::A, 2, 1, None), semi2, semi1])
    }

    const HOME_WIN: Game = Game { home: 21, away: 10 };
    const AWAY_WIN: Game = Game { home: 10, away: 21 };

    #[test]
    fn test_winners_reach_the_final() {
        let mut bracket = four_team();
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        bracket.record_game(id(2), AWAY_WIN, &single()).unwrap();
        let report = bracket.run(&single(), 5, now()).unwrap();
        assert!(report.converged);
        assert!(report.passes < 5);
        let final_match = bracket.get(id(3)).unwrap();
        assert_eq!(final_match.home, team(1));
        assert_eq!(final_match.away, team(3));
        assert_eq!(bracket.get(id(1)).unwrap().status, MatchStatus::Completed);
        assert_eq!(bracket.get(id(2)).unwrap().completed_at, Some(now()));
    }

    #[test]
    fn test_undo_cascades_through_played_final() {
        let mut bracket = four_team();
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        bracket.record_game(id(2), HOME_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        bracket.record_game(id(3), AWAY_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(3)).unwrap().winner, team(2));

        bracket.undo(id(1), &single()).unwrap();
        let report = bracket.run(&single(), 5, now()).unwrap();
        assert!(report.converged);
        let semi = bracket.get(id(1)).unwrap();
        assert_eq!(semi.winner, None);
        assert!(semi.games.is_empty());
        let final_match = bracket.get(id(3)).unwrap();
        assert_eq!(final_match.home, None);
        assert_eq!(final_match.away, team(2));
        assert_eq!(final_match.winner, None);
        assert!(final_match.games.is_empty());
        assert_eq!(final_match.status, MatchStatus::Scheduled);
    }

    #[test]
    fn test_replaced_winner_resets_downstream() {
        let mut bracket = four_team();
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        bracket.record_game(id(2), HOME_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        bracket.record_game(id(3), HOME_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();

        // The semi was scored the wrong way round: undo and enter the other result.
        bracket.undo(id(1), &single()).unwrap();
        bracket.record_game(id(1), AWAY_WIN, &single()).unwrap();
        let report = bracket.run(&single(), 5, now()).unwrap();
        assert!(report.passes < 5);
        let final_match = bracket.get(id(3)).unwrap();
        assert_eq!(final_match.home, team(4));
        assert_eq!(final_match.winner, None);
        assert!(report.changed.contains(&id(3)));
    }

    #[test]
    fn test_best_of_three_undo_keeps_earlier_games() {
        let rules = ScoringRules::default();
        let mut bracket = four_team();
        bracket.record_game(id(1), HOME_WIN, &rules).unwrap();
        bracket.record_game(id(1), AWAY_WIN, &rules).unwrap();
        bracket.record_game(id(1), HOME_WIN, &rules).unwrap();
        bracket.run(&rules, 5, now()).unwrap();
        assert_eq!(bracket.get(id(3)).unwrap().home, team(1));

        bracket.undo(id(1), &rules).unwrap();
        bracket.run(&rules, 5, now()).unwrap();
        assert_eq!(bracket.get(id(1)).unwrap().games.len(), 2);
        assert_eq!(bracket.get(id(3)).unwrap().home, None);
    }

    #[test]
    fn test_walkover_and_undo() {
        let mut bracket = four_team();
        bracket.walkover(id(2), Side::Away, now()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(3)).unwrap().away, team(3));
        assert!(matches!(
            bracket.record_game(id(2), HOME_WIN, &single()),
            Err(Error::MatchDecided { .. })
        ));

        bracket.undo(id(2), &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(2)).unwrap().status, MatchStatus::Scheduled);
        assert_eq!(bracket.get(id(3)).unwrap().away, None);
        assert!(matches!(bracket.undo(id(2), &single()), Err(Error::NothingToUndo { .. })));
    }

    #[test]
    fn test_stored_winner_must_match_games() {
        let mut bracket = four_team();
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        let mut matches = bracket.matches().to_vec();
        for m in matches.iter_mut().filter(|m| m.id == id(1)) {
            m.winner = team(4);
        }
        let mut tampered = Bracket::new(matches);
        assert!(matches!(
            tampered.run(&single(), 5, now()),
            Err(Error::WinnerMismatch { .. })
        ));
    }

    /// Eight team Series A: quarters 1-4 feed semis 5 and 6, which feed final 7.
    fn eight_team() -> Bracket {
        let quarters = [
            (1, 1, 8, 5, Slot::Home),
            (2, 4, 5, 5, Slot::Away),
            (3, 2, 7, 6, Slot::Home),
            (4, 3, 6, 6, Slot::Away),
        ];
        let mut matches: Vec<BracketMatch> = quarters
            .iter()
            .map(|&(n, home, away, next, slot)| {
                let mut qf = m(n, Series::A, 1, n as i32, Some((next, slot)));
                qf.home = team(home);
                qf.away = team(away);
                qf
            })
            .collect();
        matches.push(m(5, Series::A, 2, 1, Some((7, Slot::Home))));
        matches.push(m(6, Series::A, 2, 2, Some((7, Slot::Away))));
        matches.push(m(7, Series::A, 3, 1, None));
        Bracket::new(matches)
    }

    #[test]
    fn test_quarterfinal_reversal_unwinds_semi_and_final() {
        let mut bracket = eight_team();
        for n in 1..=4 {
            bracket.record_game(id(n), HOME_WIN, &single()).unwrap();
        }
        bracket.run(&single(), 5, now()).unwrap();
        bracket.record_game(id(5), HOME_WIN, &single()).unwrap();
        bracket.record_game(id(6), AWAY_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        bracket.record_game(id(7), AWAY_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(7)).unwrap().winner, team(3));

        bracket.undo(id(1), &single()).unwrap();
        let report = bracket.run(&single(), 5, now()).unwrap();
        assert!(report.converged);
        assert_eq!(report.resets, 3);

        let semi = bracket.get(id(5)).unwrap();
        assert_eq!((semi.home, semi.away), (None, team(4)));
        assert_eq!(semi.winner, None);
        assert!(semi.games.is_empty());
        assert_eq!(semi.status, MatchStatus::Scheduled);

        let final_match = bracket.get(id(7)).unwrap();
        assert_eq!((final_match.home, final_match.away), (None, team(3)));
        assert_eq!(final_match.winner, None);
        assert!(final_match.games.is_empty());
        assert_eq!(final_match.completed_at, None);

        // The other half of the draw keeps its result.
        assert_eq!(bracket.get(id(6)).unwrap().winner, team(3));

        bracket.record_game(id(1), AWAY_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(5)).unwrap().home, team(8));
    }

    #[test]
    fn test_unfinished_game_is_rejected() {
        let mut bracket = four_team();
        let unfinished = [
            Game { home: 20, away: 19 },
            Game { home: 21, away: 20 },
            Game { home: 15, away: 15 },
            Game { home: -1, away: 21 },
        ];
        for game in unfinished {
            assert!(matches!(
                bracket.record_game(id(1), game, &single()),
                Err(Error::GameUndecided { .. })
            ));
        }
        assert!(bracket.get(id(1)).unwrap().games.is_empty());
        assert_eq!(bracket.dirty().count(), 0);

        bracket.record_game(id(1), Game { home: 21, away: 5 }, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(1)).unwrap().winner, team(1));
        assert_eq!(bracket.get(id(3)).unwrap().home, team(1));
    }

    fn with_second_chance() -> Bracket {
        let mut a1 = m(1, Series::A, 1, 1, Some((3, Slot::Home)));
        a1.home = team(1);
        a1.away = team(4);
        a1.loser_next = Some((id(10), Slot::Home));
        let mut a2 = m(2, Series::A, 1, 2, Some((3, Slot::Away)));
        a2.home = team(2);
        a2.away = team(3);
        a2.loser_next = Some((id(11), Slot::Home));
        let mut b1 = m(10, Series::B, 1, 1, Some((12, Slot::Home)));
        b1.away = team(5);
        let mut b2 = m(11, Series::B, 1, 2, Some((12, Slot::Away)));
        b2.away = team(6);
        Bracket::new(vec![
            a1,
            a2,
            m(3, Series::A, 2, 1, None),
            b1,
            b2,
            m(12, Series::B, 2, 1, None),
        ])
    }

    #[test]
    fn test_losers_drop_into_series_b() {
        let mut bracket = with_second_chance();
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        bracket.record_game(id(2), AWAY_WIN, &single()).unwrap();
        let report = bracket.run(&single(), 5, now()).unwrap();
        assert!(report.passes < 5);
        assert_eq!(bracket.get(id(10)).unwrap().home, team(4));
        assert_eq!(bracket.get(id(11)).unwrap().home, team(2));

        // Losers can keep winning in Series B.
        bracket.record_game(id(10), HOME_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(12)).unwrap().home, team(4));

        // Reversing the Series A result takes the loser back out of Series B.
        bracket.undo(id(1), &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        assert_eq!(bracket.get(id(10)).unwrap().home, None);
        assert_eq!(bracket.get(id(12)).unwrap().home, None);
    }

    #[test]
    fn test_unrelated_occupant_is_a_conflict() {
        let mut matches = with_second_chance().matches().to_vec();
        for m in matches.iter_mut().filter(|m| m.id == id(10)) {
            m.home = team(7);
        }
        let mut bracket = Bracket::new(matches);
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        let err = bracket.run(&single(), 5, now()).unwrap_err();
        assert!(err.is_integrity());
        assert!(matches!(
            err,
            Error::SecondChanceConflict { occupant, .. } if occupant == team(7)
        ));
    }

    #[test]
    fn test_loser_seated_twice_is_a_conflict() {
        let mut matches = with_second_chance().matches().to_vec();
        for m in matches.iter_mut().filter(|m| m.id == id(11)) {
            m.away = team(4);
        }
        let mut bracket = Bracket::new(matches);
        bracket.record_game(id(1), HOME_WIN, &single()).unwrap();
        assert!(matches!(
            bracket.run(&single(), 5, now()),
            Err(Error::SecondChanceConflict { .. })
        ));
    }

    #[test]
    fn test_stale_loser_of_same_match_is_replaced() {
        let mut matches = with_second_chance().matches().to_vec();
        // Seat left behind by an earlier, reversed result of match 1.
        for m in matches.iter_mut().filter(|m| m.id == id(10)) {
            m.home = team(4);
            m.games = vec![HOME_WIN];
        }
        let mut bracket = Bracket::new(matches);
        bracket.record_game(id(1), AWAY_WIN, &single()).unwrap();
        bracket.run(&single(), 5, now()).unwrap();
        let b1 = bracket.get(id(10)).unwrap();
        assert_eq!(b1.home, team(1));
        assert!(b1.games.is_empty());
    }
}

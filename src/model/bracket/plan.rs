/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Bracket shapes, built in memory before anything is written.
use crate::error::{Error, Result};
use crate::model::draw::DrawStore;
use crate::model::kinds::{MatchStatus, Series, Slot};
use crate::model::propagation::BracketMatch;
use crate::model::seeding::{pair_round, RankedTeam};
use rand::Rng;
use schemars::JsonSchema;
use uuid::Uuid;

/// Quarterfinal matches in a second chance Series B.
pub const SECOND_CHANCE_QUARTERS: usize = 4;

/// # Seed Entry
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub team_id: Uuid,
    pub seed_no: i32,
}

/// A series ready to be written: its matches, its seeds and, for a second chance Series B,
/// the Series A first round matches whose losers drop into it.
#[derive(Debug, Clone)]
pub struct SeriesPlan {
    pub series: Series,
    pub seeds: Vec<SeedEntry>,
    pub matches: Vec<BracketMatch>,
    /// (Series A match, Series B match, seat)
    pub loser_links: Vec<(Uuid, Uuid, Slot)>,
}

impl SeriesPlan {
    /// Only the opening round is published when a bracket is created.
    pub fn first_round(&self) -> i32 {
        self.matches.iter().map(|m| m.round).min().unwrap_or(1)
    }
}

fn blank(series: Series, round: i32, match_no: i32) -> BracketMatch {
    BracketMatch {
        id: Uuid::new_v4(),
        series,
        round,
        match_no,
        status: MatchStatus::Scheduled,
        home: None,
        away: None,
        winner: None,
        next: None,
        loser_next: None,
        games: Vec::new(),
        completed_at: None,
    }
}

/// Single elimination tree, `width` matches in its first round, winners wired upward.
fn tree(series: Series, first_round: i32, width: usize) -> Vec<Vec<BracketMatch>> {
    let mut rounds: Vec<Vec<BracketMatch>> = Vec::new();
    let (mut width, mut round) = (width.max(1), first_round);
    loop {
        rounds.push((0..width).map(|k| blank(series, round, k as i32 + 1)).collect());
        if width == 1 {
            break;
        }
        width /= 2;
        round += 1;
    }
    for r in 1..rounds.len() {
        let (lower, upper) = rounds.split_at_mut(r);
        for (k, m) in lower[r - 1].iter_mut().enumerate() {
            let slot = if k % 2 == 0 { Slot::Home } else { Slot::Away };
            m.next = Some((upper[0][k / 2].id, slot));
        }
    }
    rounds
}

fn seeds(teams: &[RankedTeam]) -> Vec<SeedEntry> {
    teams
        .iter()
        .enumerate()
        .map(|(i, t)| SeedEntry {
            team_id: t.team_id,
            seed_no: i as i32 + 1,
        })
        .collect()
}

/// A plain seeded bracket. `teams` are in seed order and their count is a power of two.
pub fn plan_main<D: DrawStore + ?Sized, R: Rng + ?Sized>(
    category: &str,
    series: Series,
    teams: &[RankedTeam],
    draws: &mut D,
    rng: &mut R,
) -> Result<SeriesPlan> {
    let n = teams.len();
    if n < 2 || !n.is_power_of_two() {
        return Err(match series {
            Series::A => Error::NotEnoughTeams {
                category: category.to_string(),
                count: n,
                needed: n.next_power_of_two().max(2),
            },
            Series::B => Error::SecondChanceRequired { count: n },
        });
    }
    let mut rounds = tree(series, 1, n / 2);
    for pair in pair_round(category, series, 1, teams, draws, rng)? {
        if let Some(m) = rounds[0].get_mut(pair.match_no as usize - 1) {
            m.home = Some(pair.home);
            m.away = Some(pair.away);
        }
    }
    Ok(SeriesPlan {
        series,
        seeds: seeds(teams),
        matches: rounds.into_iter().flatten().collect(),
        loser_links: Vec::new(),
    })
}

/// Series B with room for the Series A first round losers.
///
/// Loser `i` of the `a_first_round` matches (in match order) takes the home seat of
/// quarterfinal `i * 4 / L`. The other quarterfinal seats go to Series B: its best seeds enter
/// directly, the rest play in first. The strongest direct entrants meet the Series A losers.
///
/// With `L` losers there are `8 - L` open seats and each can absorb one play-in, so Series B
/// holds `8 - L` to `2 * (8 - L)` teams. A full Series A (`L = 4`) caps Series B at 8.
pub fn plan_second_chance<D: DrawStore + ?Sized, R: Rng + ?Sized>(
    category: &str,
    teams: &[RankedTeam],
    a_first_round: &[Uuid],
    draws: &mut D,
    rng: &mut R,
) -> Result<SeriesPlan> {
    let losers = a_first_round.len();
    if losers == 0 || losers > SECOND_CHANCE_QUARTERS {
        return Err(Error::SeriesAMissing {
            category: category.to_string(),
        });
    }
    let open = 2 * SECOND_CHANCE_QUARTERS - losers;
    let m = teams.len();
    if m < open || m > 2 * open {
        return Err(Error::SecondChanceSize {
            losers,
            count: m,
            min: open,
            max: 2 * open,
        });
    }
    let play_ins = m - open;
    let direct = open - play_ins;
    let quarter_round = if play_ins > 0 { 2 } else { 1 };

    let mut rounds = tree(Series::B, quarter_round, SECOND_CHANCE_QUARTERS);
    let reserved: Vec<usize> = (0..losers)
        .map(|i| i * SECOND_CHANCE_QUARTERS / losers)
        .collect();
    let loser_links = a_first_round
        .iter()
        .zip(&reserved)
        .map(|(&a_match, &q)| (a_match, rounds[0][q].id, Slot::Home))
        .collect();

    let mut seats: Vec<(usize, Slot)> = reserved.iter().map(|&q| (q, Slot::Away)).collect();
    for q in (0..SECOND_CHANCE_QUARTERS).filter(|q| !reserved.contains(q)) {
        seats.push((q, Slot::Home));
        seats.push((q, Slot::Away));
    }

    for (team, &(q, slot)) in teams[..direct].iter().zip(&seats) {
        let m = &mut rounds[0][q];
        match slot {
            Slot::Home => m.home = Some(team.team_id),
            Slot::Away => m.away = Some(team.team_id),
        }
    }

    let mut pairs = pair_round(category, Series::B, 1, &teams[direct..], draws, rng)?;
    pairs.sort_by_key(|p| p.match_no);
    let mut matches = Vec::with_capacity(play_ins + 2 * SECOND_CHANCE_QUARTERS);
    for (k, pair) in pairs.into_iter().enumerate() {
        let (q, slot) = seats[direct + k];
        let mut play_in = blank(Series::B, 1, k as i32 + 1);
        play_in.home = Some(pair.home);
        play_in.away = Some(pair.away);
        play_in.next = Some((rounds[0][q].id, slot));
        matches.push(play_in);
    }
    matches.extend(rounds.into_iter().flatten());

    Ok(SeriesPlan {
        series: Series::B,
        seeds: seeds(teams),
        matches,
        loser_links,
    })
}

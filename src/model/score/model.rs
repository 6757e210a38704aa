/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::error::{Error, Result};
use crate::model::bracket;
use crate::model::kinds::{MatchKey, MatchKind, MatchStatus, ScoringMode};
use crate::model::sys::SysSettings;
use crate::schema::group_match;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use schemars::JsonSchema;
use uuid::Uuid;

/// # Game
/// Points for one game, home first.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Game {
    pub home: i32,
    pub away: i32,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn pick(self, home: Option<Uuid>, away: Option<Uuid>) -> Option<Uuid> {
        match self {
            Side::Home => home,
            Side::Away => away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    pub mode: ScoringMode,
    pub points: i32,
    pub cap: i32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            mode: ScoringMode::BestOfThree,
            points: 21,
            cap: 30,
        }
    }
}

impl ScoringRules {
    /// A game is decided at `points` with a two point lead, or at `cap` outright.
    pub fn game_winner(&self, game: &Game) -> Option<Side> {
        let (high, low, side) = if game.home > game.away {
            (game.home, game.away, Side::Home)
        } else if game.away > game.home {
            (game.away, game.home, Side::Away)
        } else {
            return None;
        };
        if high >= self.cap || (high >= self.points && high - low >= 2) {
            Some(side)
        } else {
            None
        }
    }

    /// Only finished games are accepted as results.
    pub fn check_game(&self, key: MatchKey, game: &Game) -> Result<Side> {
        if game.home < 0 || game.away < 0 {
            return Err(Error::GameUndecided {
                key,
                home: game.home,
                away: game.away,
            });
        }
        self.game_winner(game).ok_or(Error::GameUndecided {
            key,
            home: game.home,
            away: game.away,
        })
    }

    pub fn match_winner(&self, games: &[Game]) -> Option<Side> {
        match self.mode {
            ScoringMode::SingleGame => games.first().and_then(|g| self.game_winner(g)),
            ScoringMode::BestOfThree => {
                let (mut home, mut away) = (0, 0);
                for game in games {
                    match self.game_winner(game) {
                        Some(Side::Home) => home += 1,
                        Some(Side::Away) => away += 1,
                        None => {}
                    }
                    if home == 2 {
                        return Some(Side::Home);
                    }
                    if away == 2 {
                        return Some(Side::Away);
                    }
                }
                None
            }
        }
    }
}

pub fn games_from_columns(home: &[i32], away: &[i32]) -> Vec<Game> {
    home.iter()
        .zip(away.iter())
        .map(|(&home, &away)| Game { home, away })
        .collect()
}

pub fn games_to_columns(games: &[Game]) -> (Vec<i32>, Vec<i32>) {
    games.iter().map(|g| (g.home, g.away)).unzip()
}

/// # Score Outcome
/// Where a match stands after a score change.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub key: MatchKey,
    pub status: MatchStatus,
    pub winner: Option<Uuid>,
    pub games: Vec<Game>,
    /// Knockout matches touched by propagation, excluding `key`
    pub propagated: Vec<Uuid>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = group_match)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct GroupScoreRow {
    id: Uuid,
    status: MatchStatus,
    home_team: Option<Uuid>,
    away_team: Option<Uuid>,
    winner: Option<Uuid>,
    home_games: Vec<i32>,
    away_games: Vec<i32>,
}

impl GroupScoreRow {
    fn lock(id: Uuid, conn: &mut PgConnection) -> Result<Self> {
        group_match::table
            .filter(group_match::id.eq(id))
            .select(GroupScoreRow::as_select())
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(Error::NotFound {})
    }

    fn save(
        &self,
        games: &[Game],
        status: MatchStatus,
        winner: Option<Uuid>,
        completed_at: Option<NaiveDateTime>,
        conn: &mut PgConnection,
    ) -> Result<ScoreOutcome> {
        let (home_games, away_games) = games_to_columns(games);
        diesel::update(group_match::table.filter(group_match::id.eq(self.id)))
            .set((
                group_match::home_games.eq(home_games),
                group_match::away_games.eq(away_games),
                group_match::status.eq(status),
                group_match::winner.eq(winner),
                group_match::completed_at.eq(completed_at),
            ))
            .execute(conn)?;
        Ok(ScoreOutcome {
            key: MatchKey::group(self.id),
            status,
            winner,
            games: games.to_vec(),
            propagated: Vec::new(),
        })
    }
}

fn record_group_game(
    id: Uuid,
    game: Game,
    rules: &ScoringRules,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    conn.transaction(|conn| {
        let row = GroupScoreRow::lock(id, conn)?;
        let key = MatchKey::group(id);
        if row.home_team.is_none() || row.away_team.is_none() {
            return Err(Error::MatchIncomplete { key });
        }
        if row.status != MatchStatus::Scheduled || row.winner.is_some() {
            return Err(Error::MatchDecided { key });
        }
        rules.check_game(key, &game)?;
        let mut games = games_from_columns(&row.home_games, &row.away_games);
        games.push(game);
        match rules
            .match_winner(&games)
            .and_then(|side| side.pick(row.home_team, row.away_team))
        {
            Some(winner) => row.save(&games, MatchStatus::Completed, Some(winner), Some(now), conn),
            None => row.save(&games, MatchStatus::Scheduled, None, None, conn),
        }
    })
}

fn undo_group_game(id: Uuid, conn: &mut PgConnection) -> Result<ScoreOutcome> {
    conn.transaction(|conn| {
        let row = GroupScoreRow::lock(id, conn)?;
        let mut games = games_from_columns(&row.home_games, &row.away_games);
        if row.status != MatchStatus::Walkover && games.pop().is_none() {
            return Err(Error::NothingToUndo {
                key: MatchKey::group(id),
            });
        }
        row.save(&games, MatchStatus::Scheduled, None, None, conn)
    })
}

fn group_walkover(
    id: Uuid,
    side: Side,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    conn.transaction(|conn| {
        let row = GroupScoreRow::lock(id, conn)?;
        let key = MatchKey::group(id);
        if row.status != MatchStatus::Scheduled || row.winner.is_some() {
            return Err(Error::MatchDecided { key });
        }
        let winner = side
            .pick(row.home_team, row.away_team)
            .ok_or(Error::MatchIncomplete { key })?;
        row.save(&[], MatchStatus::Walkover, Some(winner), Some(now), conn)
    })
}

/// Records one game. Knockout results flow through bracket propagation.
pub fn record_game(
    key: MatchKey,
    game: Game,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    let outcome = match key.kind {
        MatchKind::Group => record_group_game(key.id, game, &settings.rules(), now, conn),
        MatchKind::Knockout => bracket::record_game(key.id, game, settings, now, conn),
    }?;
    tracing::info!(match_key = %key, home = game.home, away = game.away, winner = ?outcome.winner, "game recorded");
    Ok(outcome)
}

pub fn undo_game(
    key: MatchKey,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    let outcome = match key.kind {
        MatchKind::Group => undo_group_game(key.id, conn),
        MatchKind::Knockout => bracket::undo_game(key.id, settings, now, conn),
    }?;
    tracing::info!(match_key = %key, unwound = outcome.propagated.len(), "result undone");
    Ok(outcome)
}

pub fn walkover(
    key: MatchKey,
    side: Side,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    let outcome = match key.kind {
        MatchKind::Group => group_walkover(key.id, side, now, conn),
        MatchKind::Knockout => bracket::walkover(key.id, side, settings, now, conn),
    }?;
    tracing::info!(match_key = %key, winner = ?outcome.winner, "walkover recorded");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(home: i32, away: i32) -> Game {
        Game { home, away }
    }

    #[test]
    fn test_game_needs_two_point_lead() {
        let rules = ScoringRules::default();
        assert_eq!(rules.game_winner(&g(21, 15)), Some(Side::Home));
        assert_eq!(rules.game_winner(&g(21, 20)), None);
        assert_eq!(rules.game_winner(&g(22, 24)), Some(Side::Away));
        assert_eq!(rules.game_winner(&g(30, 29)), Some(Side::Home));
        assert_eq!(rules.game_winner(&g(12, 12)), None);
    }

    #[test]
    fn test_best_of_three() {
        let rules = ScoringRules::default();
        assert_eq!(rules.match_winner(&[g(21, 10)]), None);
        assert_eq!(rules.match_winner(&[g(21, 10), g(10, 21)]), None);
        assert_eq!(
            rules.match_winner(&[g(21, 10), g(10, 21), g(19, 21)]),
            Some(Side::Away)
        );
        assert_eq!(
            rules.match_winner(&[g(21, 10), g(21, 19), g(0, 21)]),
            Some(Side::Home)
        );
    }

    #[test]
    fn test_single_game() {
        let rules = ScoringRules {
            mode: ScoringMode::SingleGame,
            ..ScoringRules::default()
        };
        assert_eq!(rules.match_winner(&[g(15, 21)]), Some(Side::Away));
        assert_eq!(rules.match_winner(&[g(20, 21)]), None);
        assert_eq!(rules.match_winner(&[]), None);
    }

    #[test]
    fn test_check_game_needs_a_finished_game() {
        let rules = ScoringRules::default();
        let key = MatchKey::group(Uuid::from_u128(7));
        assert_eq!(rules.check_game(key, &g(21, 5)).unwrap(), Side::Home);
        assert_eq!(rules.check_game(key, &g(28, 30)).unwrap(), Side::Away);
        assert!(matches!(
            rules.check_game(key, &g(20, 19)),
            Err(Error::GameUndecided { home: 20, away: 19, .. })
        ));
        assert!(matches!(
            rules.check_game(key, &g(-3, 21)),
            Err(Error::GameUndecided { .. })
        ));
        // A single unfinished game must never stand as the match.
        let single = ScoringRules {
            mode: ScoringMode::SingleGame,
            ..rules
        };
        assert!(single.check_game(key, &g(20, 19)).is_err());
    }

    #[test]
    fn test_columns() {
        let games = vec![g(21, 3), g(4, 21)];
        let (home, away) = games_to_columns(&games);
        assert_eq!(home, vec![21, 4]);
        assert_eq!(games_from_columns(&home, &away), games);
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::error::{MapRre, Result};
use crate::model::kinds::{MatchKey, MatchStatus, Series, Stage};
use crate::schema::{group_match, knockout_match, team_member};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use schemars::JsonSchema;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// # Bracket Position
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct BracketPosition {
    pub category: String,
    pub series: Series,
    pub round: i32,
    pub match_no: i32,
}

/// # Pool Match
/// A candidate match as the scheduler sees it.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct PoolMatch {
    pub key: MatchKey,
    pub status: MatchStatus,
    pub home: Option<Uuid>,
    pub away: Option<Uuid>,
    pub winner: Option<Uuid>,
    /// Distinct players of both sides, sorted
    pub players: Vec<Uuid>,
    /// Always true for group matches
    pub published: bool,
    pub position: Option<BracketPosition>,
    pub completed_at: Option<NaiveDateTime>,
}

impl PoolMatch {
    /// Scheduled, both sides known and (for knockout) published.
    pub fn is_list_eligible(&self) -> bool {
        self.status == MatchStatus::Scheduled
            && self.home.is_some()
            && self.away.is_some()
            && self.published
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.status, MatchStatus::Completed | MatchStatus::Walkover)
            && self.winner.is_some()
    }

    pub fn shares_player_with(&self, other: &PoolMatch) -> bool {
        self.players.iter().any(|p| other.players.contains(p))
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = group_match)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct GroupPoolRow {
    id: Uuid,
    status: MatchStatus,
    home_team: Option<Uuid>,
    away_team: Option<Uuid>,
    winner: Option<Uuid>,
    completed_at: Option<NaiveDateTime>,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = knockout_match)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct KnockoutPoolRow {
    id: Uuid,
    category: String,
    series: Series,
    round: i32,
    match_no: i32,
    published: bool,
    status: MatchStatus,
    home_team: Option<Uuid>,
    away_team: Option<Uuid>,
    winner: Option<Uuid>,
    completed_at: Option<NaiveDateTime>,
}

fn roster(
    teams: &[Option<Uuid>],
    members: &HashMap<Uuid, Vec<Uuid>>,
) -> Vec<Uuid> {
    teams
        .iter()
        .flatten()
        .filter_map(|team| members.get(team))
        .flatten()
        .copied()
        .collect::<BTreeSet<Uuid>>()
        .into_iter()
        .collect()
}

/// Loads every match scheduled under `stage`: group matches tagged with the stage, plus the
/// whole knockout table when `stage` is `Knockout`.
pub fn load_pool(stage: Stage, conn: &mut PgConnection) -> Result<Vec<PoolMatch>> {
    let groups: Vec<GroupPoolRow> = group_match::table
        .filter(group_match::stage.eq(stage))
        .select(GroupPoolRow::as_select())
        .load(conn)?;
    let knockouts: Vec<KnockoutPoolRow> = match stage {
        Stage::Group => Vec::new(),
        Stage::Knockout => knockout_match::table
            .select(KnockoutPoolRow::as_select())
            .load(conn)?,
    };

    let team_ids: BTreeSet<Uuid> = groups
        .iter()
        .flat_map(|m| [m.home_team, m.away_team])
        .chain(knockouts.iter().flat_map(|m| [m.home_team, m.away_team]))
        .flatten()
        .collect();
    let mut members: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let rows: Vec<(Uuid, Uuid)> = team_member::table
        .filter(team_member::team_id.eq_any(team_ids.into_iter().collect::<Vec<_>>()))
        .select((team_member::team_id, team_member::player_id))
        .load(conn)
        .map_rre()?;
    for (team, player) in rows {
        members.entry(team).or_default().push(player);
    }

    let mut pool: Vec<PoolMatch> = groups
        .into_iter()
        .map(|m| PoolMatch {
            key: MatchKey::group(m.id),
            status: m.status,
            home: m.home_team,
            away: m.away_team,
            winner: m.winner,
            players: roster(&[m.home_team, m.away_team], &members),
            published: true,
            position: None,
            completed_at: m.completed_at,
        })
        .collect();
    pool.extend(knockouts.into_iter().map(|m| PoolMatch {
        key: MatchKey::knockout(m.id),
        status: m.status,
        home: m.home_team,
        away: m.away_team,
        winner: m.winner,
        players: roster(&[m.home_team, m.away_team], &members),
        published: m.published,
        position: Some(BracketPosition {
            category: m.category,
            series: m.series,
            round: m.round,
            match_no: m.match_no,
        }),
        completed_at: m.completed_at,
    }));
    Ok(pool)
}

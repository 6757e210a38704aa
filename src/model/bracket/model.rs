/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::error::{Error, MapRre, Result};
use crate::model::bracket::plan::{plan_main, plan_second_chance, SeedEntry, SeriesPlan};
use crate::model::court::PgStore;
use crate::model::kinds::{AssignmentStatus, MatchKey, MatchKind, MatchStatus, Series, Slot};
use crate::model::propagation::{Bracket, BracketMatch, PropagationReport};
use crate::model::score::{games_from_columns, games_to_columns, Game, ScoreOutcome, Side};
use crate::model::seeding::{global_rank, split_series, RankedTeam};
use crate::model::sys::SysSettings;
use crate::schema::{
    blocked_match, court_assignment, forced_priority, group_stage_lock, group_standing,
    knockout_match, seed,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use schemars::JsonSchema;
use uuid::Uuid;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = knockout_match)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct KnockoutRow {
    id: Uuid,
    series: Series,
    round: i32,
    match_no: i32,
    status: MatchStatus,
    home_team: Option<Uuid>,
    away_team: Option<Uuid>,
    winner: Option<Uuid>,
    next_match_id: Option<Uuid>,
    next_slot: Option<i32>,
    loser_next_match_id: Option<Uuid>,
    loser_next_slot: Option<i32>,
    home_games: Vec<i32>,
    away_games: Vec<i32>,
    completed_at: Option<NaiveDateTime>,
}

fn link(id: Option<Uuid>, slot: Option<i32>) -> Option<(Uuid, Slot)> {
    Some((id?, Slot::from_db(slot?)?))
}

impl From<KnockoutRow> for BracketMatch {
    fn from(row: KnockoutRow) -> Self {
        BracketMatch {
            id: row.id,
            series: row.series,
            round: row.round,
            match_no: row.match_no,
            status: row.status,
            home: row.home_team,
            away: row.away_team,
            winner: row.winner,
            next: link(row.next_match_id, row.next_slot),
            loser_next: link(row.loser_next_match_id, row.loser_next_slot),
            games: games_from_columns(&row.home_games, &row.away_games),
            completed_at: row.completed_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = knockout_match)]
struct NewKnockoutMatch<'a> {
    id: Uuid,
    category: &'a str,
    series: Series,
    round: i32,
    match_no: i32,
    published: bool,
    status: MatchStatus,
    home_team: Option<Uuid>,
    away_team: Option<Uuid>,
    next_match_id: Option<Uuid>,
    next_slot: Option<i32>,
    created: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = group_standing)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct StandingRow {
    team_id: Uuid,
    group_id: Uuid,
    group_rank: i32,
    metric: i32,
    points_against: f64,
}

/// # Generated Bracket
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct GeneratedBracket {
    pub category: String,
    pub series: Series,
    pub seeds: Vec<SeedEntry>,
    pub matches: Vec<BracketMatch>,
}

/// # Cleared Bracket
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearedBracket {
    pub matches: usize,
    pub seeds: usize,
    /// Assignments pulled off court
    pub canceled: usize,
}

/// # Generate Request
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Series B only: make room for Series A first round losers
    #[serde(default)]
    pub second_chance: bool,
}

fn load_series(category: &str, series: Series, conn: &mut PgConnection) -> Result<Vec<BracketMatch>> {
    Ok(knockout_match::table
        .filter(knockout_match::category.eq(category))
        .filter(knockout_match::series.eq(series))
        .order((knockout_match::round.asc(), knockout_match::match_no.asc()))
        .select(KnockoutRow::as_select())
        .load(conn)?
        .into_iter()
        .map(BracketMatch::from)
        .collect())
}

/// Loads every knockout match of `category`, locked until the transaction ends.
fn load_bracket(category: &str, conn: &mut PgConnection) -> Result<Bracket> {
    let rows = knockout_match::table
        .filter(knockout_match::category.eq(category))
        .select(KnockoutRow::as_select())
        .for_update()
        .load(conn)?;
    Ok(Bracket::new(rows.into_iter().map(BracketMatch::from).collect()))
}

fn save_bracket(bracket: &Bracket, conn: &mut PgConnection) -> Result<()> {
    for m in bracket.dirty() {
        let (home_games, away_games) = games_to_columns(&m.games);
        diesel::update(knockout_match::table.filter(knockout_match::id.eq(m.id)))
            .set((
                knockout_match::status.eq(m.status),
                knockout_match::home_team.eq(m.home),
                knockout_match::away_team.eq(m.away),
                knockout_match::winner.eq(m.winner),
                knockout_match::home_games.eq(home_games),
                knockout_match::away_games.eq(away_games),
                knockout_match::completed_at.eq(m.completed_at),
            ))
            .execute(conn)?;
    }
    Ok(())
}

fn is_played(m: &BracketMatch) -> bool {
    m.status != MatchStatus::Scheduled || m.winner.is_some() || !m.games.is_empty()
}

/// Series A can't be removed while a second chance Series B hangs off its losers.
fn check_second_chance_free(category: &str, series: Series, existing: &[BracketMatch]) -> Result<()> {
    if series == Series::A && existing.iter().any(|m| m.loser_next.is_some()) {
        return Err(Error::BracketExists {
            category: category.to_string(),
            series,
        });
    }
    Ok(())
}

fn load_ranking(category: &str, conn: &mut PgConnection) -> Result<Vec<RankedTeam>> {
    let locked = group_stage_lock::table
        .filter(group_stage_lock::category.eq(category))
        .count()
        .get_result::<i64>(conn)?;
    if locked == 0 {
        return Err(Error::StageNotLocked {
            category: category.to_string(),
        });
    }
    Ok(group_standing::table
        .filter(group_standing::category.eq(category))
        .select(StandingRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| RankedTeam {
            team_id: row.team_id,
            group_id: row.group_id.to_string(),
            group_rank: row.group_rank,
            metric: f64::from(row.metric),
            points_against: row.points_against,
        })
        .collect())
}

/// Removes a series and every scheduling reference to it. Runs inside the caller's
/// transaction.
fn delete_series(
    category: &str,
    series: Series,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ClearedBracket> {
    let ids: Vec<Uuid> = knockout_match::table
        .filter(knockout_match::category.eq(category))
        .filter(knockout_match::series.eq(series))
        .select(knockout_match::id)
        .load(conn)?;
    let canceled = diesel::update(
        court_assignment::table
            .filter(court_assignment::knockout_match_id.eq_any(ids.clone()))
            .filter(court_assignment::status.eq(AssignmentStatus::Active)),
    )
    .set((
        court_assignment::status.eq(AssignmentStatus::Canceled),
        court_assignment::cleared_at.eq(Some(now)),
    ))
    .execute(conn)?;
    diesel::delete(
        forced_priority::table
            .filter(forced_priority::match_kind.eq(MatchKind::Knockout))
            .filter(forced_priority::match_id.eq_any(ids.clone())),
    )
    .execute(conn)?;
    diesel::delete(
        blocked_match::table
            .filter(blocked_match::match_kind.eq(MatchKind::Knockout))
            .filter(blocked_match::match_id.eq_any(ids.clone())),
    )
    .execute(conn)?;
    diesel::update(knockout_match::table.filter(knockout_match::loser_next_match_id.eq_any(ids.clone())))
        .set((
            knockout_match::loser_next_match_id.eq(None::<Uuid>),
            knockout_match::loser_next_slot.eq(None::<i32>),
        ))
        .execute(conn)?;
    let seeds = diesel::delete(
        seed::table
            .filter(seed::category.eq(category))
            .filter(seed::series.eq(series)),
    )
    .execute(conn)?;
    let matches = diesel::delete(knockout_match::table.filter(knockout_match::id.eq_any(ids.clone())))
        .execute(conn)?;
    Ok(ClearedBracket {
        matches,
        seeds,
        canceled,
    })
}

fn insert_plan(
    category: &str,
    plan: &SeriesPlan,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<()> {
    let first_round = plan.first_round();
    let rows: Vec<NewKnockoutMatch> = plan
        .matches
        .iter()
        .map(|m| NewKnockoutMatch {
            id: m.id,
            category,
            series: plan.series,
            round: m.round,
            match_no: m.match_no,
            published: m.round == first_round,
            status: MatchStatus::Scheduled,
            home_team: m.home,
            away_team: m.away,
            next_match_id: m.next.map(|(id, _)| id),
            next_slot: m.next.map(|(_, slot)| slot.to_db()),
            created: now,
        })
        .collect();
    diesel::insert_into(knockout_match::table)
        .values(&rows)
        .execute(conn)?;
    let seeds: Vec<_> = plan
        .seeds
        .iter()
        .map(|s| {
            (
                seed::category.eq(category),
                seed::series.eq(plan.series),
                seed::team_id.eq(s.team_id),
                seed::seed_no.eq(s.seed_no),
            )
        })
        .collect();
    diesel::insert_into(seed::table).values(seeds).execute(conn)?;
    for (a_match, b_match, slot) in &plan.loser_links {
        diesel::update(knockout_match::table.filter(knockout_match::id.eq(a_match)))
            .set((
                knockout_match::loser_next_match_id.eq(Some(*b_match)),
                knockout_match::loser_next_slot.eq(Some(slot.to_db())),
            ))
            .execute(conn)?;
    }
    Ok(())
}

/// Builds a series from the locked group ranking, replacing an unplayed one.
///
/// All of it happens in one transaction: either the old series is gone and the new one is
/// fully wired, or nothing changed.
pub fn generate(
    category: &str,
    series: Series,
    second_chance: bool,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<GeneratedBracket> {
    let generated = conn.transaction::<_, Error, _>(|conn| {
        let existing = load_series(category, series, conn)?;
        if existing.iter().any(is_played) {
            return Err(Error::BracketExists {
                category: category.to_string(),
                series,
            });
        }
        check_second_chance_free(category, series, &existing)?;

        let standings = load_ranking(category, conn)?;
        let a_size = settings.series_a_size(category);
        let ranked_count = standings.len();
        if standings.len() < a_size {
            return Err(Error::NotEnoughTeams {
                category: category.to_string(),
                count: standings.len(),
                needed: a_size,
            });
        }
        let a_first_round: Vec<Uuid> = match series {
            Series::B if second_chance => load_series(category, Series::A, conn)?
                .into_iter()
                .filter(|m| m.round == 1)
                .map(|m| m.id)
                .collect(),
            _ => Vec::new(),
        };

        let plan = {
            let mut draws = PgStore::new(conn);
            let mut rng = ChaCha12Rng::from_entropy();
            let ranked = global_rank(category, standings, &mut draws, &mut rng)?;
            let (series_a, series_b) = split_series(ranked, a_size);
            if series == Series::B && series_b.len() < 2 {
                return Err(Error::NotEnoughTeams {
                    category: category.to_string(),
                    count: ranked_count,
                    needed: a_size + 2,
                });
            }
            match series {
                Series::A => plan_main(category, Series::A, &series_a, &mut draws, &mut rng)?,
                Series::B if second_chance => {
                    if a_first_round.is_empty() {
                        return Err(Error::SeriesAMissing {
                            category: category.to_string(),
                        });
                    }
                    plan_second_chance(category, &series_b, &a_first_round, &mut draws, &mut rng)?
                }
                Series::B => plan_main(category, Series::B, &series_b, &mut draws, &mut rng)?,
            }
        };

        delete_series(category, series, now, conn)?;
        insert_plan(category, &plan, now, conn)?;
        Ok(GeneratedBracket {
            category: category.to_string(),
            series,
            seeds: plan.seeds,
            matches: plan.matches,
        })
    })?;
    tracing::info!(
        category,
        %series,
        second_chance,
        matches = generated.matches.len(),
        "bracket generated"
    );
    Ok(generated)
}

/// Deletes a series and whatever scheduling refers to it. Series A stays while a second
/// chance Series B is wired to it; clear B first.
pub fn clear(
    category: &str,
    series: Series,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ClearedBracket> {
    let cleared = conn.transaction::<_, Error, _>(|conn| {
        check_second_chance_free(category, series, &load_series(category, series, conn)?)?;
        delete_series(category, series, now, conn)
    })?;
    if cleared.matches == 0 {
        return Error::not_found();
    }
    tracing::info!(
        category,
        %series,
        matches = cleared.matches,
        canceled = cleared.canceled,
        "bracket cleared"
    );
    Ok(cleared)
}

/// Makes a round schedulable. Returns how many matches it holds.
pub fn publish_round(
    category: &str,
    series: Series,
    round: i32,
    conn: &mut PgConnection,
) -> Result<usize> {
    let count = diesel::update(
        knockout_match::table
            .filter(knockout_match::category.eq(category))
            .filter(knockout_match::series.eq(series))
            .filter(knockout_match::round.eq(round)),
    )
    .set(knockout_match::published.eq(true))
    .execute(conn)
    .map_rre()?;
    if count == 0 {
        return Error::not_found();
    }
    tracing::info!(category, %series, round, count, "round published");
    Ok(count)
}

/// Runs propagation over a whole category and saves the outcome.
pub fn propagate(
    category: &str,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<PropagationReport> {
    let report = conn.transaction::<_, Error, _>(|conn| {
        let mut bracket = load_bracket(category, conn)?;
        let report = bracket.run(&settings.rules(), settings.propagation_max_passes, now)?;
        save_bracket(&bracket, conn)?;
        Ok(report)
    });
    match &report {
        Ok(report) => tracing::info!(
            category,
            passes = report.passes,
            changed = report.changed.len(),
            resets = report.resets,
            "propagation finished"
        ),
        Err(e) if e.is_integrity() => {
            tracing::error!(category, error = %e, "propagation aborted on integrity violation")
        }
        Err(_) => {}
    }
    report
}

pub fn categories(conn: &mut PgConnection) -> Result<Vec<String>> {
    knockout_match::table
        .select(knockout_match::category)
        .distinct()
        .order(knockout_match::category.asc())
        .load(conn)
        .map_rre()
}

/// Applies `change` to the match's bracket, propagates and saves, all in one transaction.
fn score_change<F>(
    id: Uuid,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
    change: F,
) -> Result<ScoreOutcome>
where
    F: FnOnce(&mut Bracket) -> Result<()>,
{
    conn.transaction::<_, Error, _>(|conn| {
        let category: String = knockout_match::table
            .filter(knockout_match::id.eq(id))
            .select(knockout_match::category)
            .first(conn)
            .optional()?
            .ok_or(Error::NotFound {})?;
        let mut bracket = load_bracket(&category, conn)?;
        change(&mut bracket)?;
        bracket.run(&settings.rules(), settings.propagation_max_passes, now)?;
        save_bracket(&bracket, conn)?;
        let m = bracket.get(id).ok_or(Error::NotFound {})?;
        Ok(ScoreOutcome {
            key: MatchKey::knockout(id),
            status: m.status,
            winner: m.winner,
            games: m.games.clone(),
            propagated: bracket.dirty().map(|d| d.id).filter(|d| *d != id).collect(),
        })
    })
}

pub fn record_game(
    id: Uuid,
    game: Game,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    let rules = settings.rules();
    score_change(id, settings, now, conn, |bracket| bracket.record_game(id, game, &rules))
}

pub fn undo_game(
    id: Uuid,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    let rules = settings.rules();
    score_change(id, settings, now, conn, |bracket| bracket.undo(id, &rules))
}

pub fn walkover(
    id: Uuid,
    side: Side,
    settings: &SysSettings,
    now: NaiveDateTime,
    conn: &mut PgConnection,
) -> Result<ScoreOutcome> {
    score_change(id, settings, now, conn, |bracket| bracket.walkover(id, side, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_round(n: u128, series: Series) -> BracketMatch {
        BracketMatch {
            id: Uuid::from_u128(n),
            series,
            round: 1,
            match_no: n as i32,
            status: MatchStatus::Scheduled,
            home: Some(Uuid::from_u128(100 + n)),
            away: Some(Uuid::from_u128(200 + n)),
            winner: None,
            next: None,
            loser_next: None,
            games: Vec::new(),
            completed_at: None,
        }
    }

    #[test]
    fn test_wired_series_a_is_kept() {
        let mut a = vec![first_round(1, Series::A), first_round(2, Series::A)];
        assert!(check_second_chance_free("open", Series::A, &a).is_ok());

        a[1].loser_next = Some((Uuid::from_u128(50), Slot::Home));
        assert!(matches!(
            check_second_chance_free("open", Series::A, &a),
            Err(Error::BracketExists { series: Series::A, .. })
        ));
    }

    #[test]
    fn test_series_b_can_always_go() {
        let b = vec![first_round(50, Series::B)];
        assert!(check_second_chance_free("open", Series::B, &b).is_ok());
        assert!(check_second_chance_free("open", Series::B, &[]).is_ok());
    }
}

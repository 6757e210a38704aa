/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::error::{map_unique, MapRre, Result};
use crate::model::court::model::{BlockedMatch, Court, CourtAssignment, ScheduleConfig, Snapshot};
use crate::model::fairness::{LastBatch, LastBatchEntry};
use crate::model::kinds::{AssignmentStatus, MatchKey, MatchKind, Stage};
use crate::model::pool::load_pool;
use crate::schema::{
    blocked_match, court, court_assignment, court_lock, forced_priority, last_batch_entry,
    schedule_config,
};
use chrono::NaiveDateTime;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use uuid::Uuid;

/// Storage the scheduler runs against.
///
/// The "one ACTIVE row per court and per match" rules belong to the store: a second writer
/// must get [`crate::Error::AlreadyAssigned`] from `insert_assignment`.
pub trait ScheduleStore {
    /// `window` bounds the last batch read back from storage.
    fn snapshot(&mut self, stage: Stage, window: usize) -> Result<Snapshot>;

    fn is_match_active(&mut self, stage: Stage, key: MatchKey) -> Result<bool>;

    /// ACTIVE rows holding `key` in any stage.
    fn active_for_match(&mut self, key: MatchKey) -> Result<Vec<CourtAssignment>>;

    fn insert_assignment(&mut self, assignment: &CourtAssignment) -> Result<CourtAssignment>;

    /// Moves an ACTIVE row to `status`. Closing a row that is no longer ACTIVE does nothing.
    fn close_assignment(&mut self, id: Uuid, status: AssignmentStatus, at: NaiveDateTime) -> Result<()>;

    fn set_court_lock(&mut self, court: i32, stage: Stage, locked: bool, at: NaiveDateTime) -> Result<()>;

    fn add_forced(&mut self, stage: Stage, key: MatchKey, at: NaiveDateTime) -> Result<()>;

    fn remove_forced(&mut self, stage: Stage, key: MatchKey) -> Result<()>;

    fn add_block(&mut self, key: MatchKey, reason: &str, at: NaiveDateTime) -> Result<()>;

    fn remove_block(&mut self, key: MatchKey) -> Result<()>;

    fn save_config(&mut self, config: &ScheduleConfig, at: NaiveDateTime) -> Result<()>;

    /// Runs `f` atomically; nothing it wrote survives an `Err`.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;
}

pub struct PgStore<'c> {
    pub(crate) conn: &'c mut PgConnection,
}

impl<'c> PgStore<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        PgStore { conn }
    }
}

fn kind_filter(key: MatchKey) -> Box<dyn BoxableExpression<court_assignment::table, diesel::pg::Pg, SqlType = diesel::sql_types::Bool>> {
    match key.kind {
        MatchKind::Group => Box::new(court_assignment::group_match_id.eq(key.id).assume_not_null()),
        MatchKind::Knockout => {
            Box::new(court_assignment::knockout_match_id.eq(key.id).assume_not_null())
        }
    }
}

#[derive(Queryable, Debug)]
struct LastBatchRow {
    position: i32,
    match_kind: MatchKind,
    match_id: Uuid,
    player_ids: Vec<Uuid>,
    assigned_at: NaiveDateTime,
}

impl ScheduleStore for PgStore<'_> {
    fn snapshot(&mut self, stage: Stage, window: usize) -> Result<Snapshot> {
        let courts = court::table
            .order((court::sort_order.asc(), court::id.asc()))
            .select(Court::as_select())
            .load(self.conn)?;
        let locked = court_lock::table
            .filter(court_lock::stage.eq(stage))
            .select(court_lock::court_id)
            .load::<i32>(self.conn)?
            .into_iter()
            .collect();
        let active = court_assignment::table
            .filter(court_assignment::stage.eq(stage))
            .filter(court_assignment::status.eq(AssignmentStatus::Active))
            .select(CourtAssignment::as_select())
            .load(self.conn)?;
        let forced = forced_priority::table
            .filter(forced_priority::stage.eq(stage))
            .order(forced_priority::id.asc())
            .select((forced_priority::match_kind, forced_priority::match_id))
            .load::<(MatchKind, Uuid)>(self.conn)?
            .into_iter()
            .map(|(kind, id)| MatchKey { kind, id })
            .collect();
        let blocked = blocked_match::table
            .order(blocked_match::created.asc())
            .select((blocked_match::match_kind, blocked_match::match_id, blocked_match::reason))
            .load::<(MatchKind, Uuid, String)>(self.conn)?
            .into_iter()
            .map(|(kind, id, reason)| BlockedMatch {
                key: MatchKey { kind, id },
                reason,
            })
            .collect();
        let auto_schedule = schedule_config::table
            .filter(schedule_config::stage.eq(stage))
            .select(schedule_config::auto_schedule)
            .first::<bool>(self.conn)
            .optional()?
            .unwrap_or(false);
        let rows = last_batch_entry::table
            .filter(last_batch_entry::stage.eq(stage))
            .select((
                last_batch_entry::position,
                last_batch_entry::match_kind,
                last_batch_entry::match_id,
                last_batch_entry::player_ids,
                last_batch_entry::assigned_at,
            ))
            .load::<LastBatchRow>(self.conn)?
            .into_iter()
            .map(|row| {
                (
                    row.position,
                    LastBatchEntry {
                        key: MatchKey {
                            kind: row.match_kind,
                            id: row.match_id,
                        },
                        players: row.player_ids,
                        assigned_at: row.assigned_at,
                    },
                )
            })
            .collect();
        Ok(Snapshot {
            stage,
            courts,
            locked,
            active,
            pool: load_pool(stage, self.conn)?,
            forced,
            blocked,
            config: ScheduleConfig {
                stage,
                auto_schedule,
                last_batch: LastBatch::from_rows(rows, window),
            },
        })
    }

    fn is_match_active(&mut self, stage: Stage, key: MatchKey) -> Result<bool> {
        diesel::select(diesel::dsl::exists(
            court_assignment::table
                .filter(court_assignment::stage.eq(stage))
                .filter(court_assignment::status.eq(AssignmentStatus::Active))
                .filter(kind_filter(key)),
        ))
        .get_result(self.conn)
        .map_rre()
    }

    fn active_for_match(&mut self, key: MatchKey) -> Result<Vec<CourtAssignment>> {
        court_assignment::table
            .filter(court_assignment::status.eq(AssignmentStatus::Active))
            .filter(kind_filter(key))
            .select(CourtAssignment::as_select())
            .load(self.conn)
            .map_rre()
    }

    fn insert_assignment(&mut self, assignment: &CourtAssignment) -> Result<CourtAssignment> {
        diesel::insert_into(court_assignment::table)
            .values(assignment)
            .returning(CourtAssignment::as_returning())
            .get_result(self.conn)
            .map_err(map_unique)
    }

    fn close_assignment(&mut self, id: Uuid, status: AssignmentStatus, at: NaiveDateTime) -> Result<()> {
        diesel::update(
            court_assignment::table
                .filter(court_assignment::id.eq(id))
                .filter(court_assignment::status.eq(AssignmentStatus::Active)),
        )
        .set((
            court_assignment::status.eq(status),
            court_assignment::cleared_at.eq(Some(at)),
        ))
        .execute(self.conn)?;
        Ok(())
    }

    fn set_court_lock(&mut self, court: i32, stage: Stage, locked: bool, at: NaiveDateTime) -> Result<()> {
        if locked {
            diesel::insert_into(court_lock::table)
                .values((
                    court_lock::court_id.eq(court),
                    court_lock::stage.eq(stage),
                    court_lock::created.eq(at),
                ))
                .on_conflict_do_nothing()
                .execute(self.conn)?;
        } else {
            diesel::delete(
                court_lock::table
                    .filter(court_lock::court_id.eq(court))
                    .filter(court_lock::stage.eq(stage)),
            )
            .execute(self.conn)?;
        }
        Ok(())
    }

    fn add_forced(&mut self, stage: Stage, key: MatchKey, at: NaiveDateTime) -> Result<()> {
        diesel::insert_into(forced_priority::table)
            .values((
                forced_priority::stage.eq(stage),
                forced_priority::match_kind.eq(key.kind),
                forced_priority::match_id.eq(key.id),
                forced_priority::created.eq(at),
            ))
            .on_conflict_do_nothing()
            .execute(self.conn)?;
        Ok(())
    }

    fn remove_forced(&mut self, stage: Stage, key: MatchKey) -> Result<()> {
        diesel::delete(
            forced_priority::table
                .filter(forced_priority::stage.eq(stage))
                .filter(forced_priority::match_kind.eq(key.kind))
                .filter(forced_priority::match_id.eq(key.id)),
        )
        .execute(self.conn)?;
        Ok(())
    }

    fn add_block(&mut self, key: MatchKey, reason: &str, at: NaiveDateTime) -> Result<()> {
        diesel::insert_into(blocked_match::table)
            .values((
                blocked_match::match_kind.eq(key.kind),
                blocked_match::match_id.eq(key.id),
                blocked_match::reason.eq(reason),
                blocked_match::created.eq(at),
            ))
            .on_conflict((blocked_match::match_kind, blocked_match::match_id))
            .do_update()
            .set(blocked_match::reason.eq(reason))
            .execute(self.conn)?;
        Ok(())
    }

    fn remove_block(&mut self, key: MatchKey) -> Result<()> {
        diesel::delete(
            blocked_match::table
                .filter(blocked_match::match_kind.eq(key.kind))
                .filter(blocked_match::match_id.eq(key.id)),
        )
        .execute(self.conn)?;
        Ok(())
    }

    fn save_config(&mut self, config: &ScheduleConfig, at: NaiveDateTime) -> Result<()> {
        diesel::insert_into(schedule_config::table)
            .values((
                schedule_config::stage.eq(config.stage),
                schedule_config::auto_schedule.eq(config.auto_schedule),
                schedule_config::updated.eq(at),
            ))
            .on_conflict(schedule_config::stage)
            .do_update()
            .set((
                schedule_config::auto_schedule.eq(config.auto_schedule),
                schedule_config::updated.eq(at),
            ))
            .execute(self.conn)?;
        diesel::delete(last_batch_entry::table.filter(last_batch_entry::stage.eq(config.stage)))
            .execute(self.conn)?;
        let rows: Vec<_> = config
            .last_batch
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                (
                    last_batch_entry::stage.eq(config.stage),
                    last_batch_entry::position.eq(position as i32),
                    last_batch_entry::match_kind.eq(entry.key.kind),
                    last_batch_entry::match_id.eq(entry.key.id),
                    last_batch_entry::player_ids.eq(entry.players.clone()),
                    last_batch_entry::assigned_at.eq(entry.assigned_at),
                )
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(last_batch_entry::table)
                .values(rows)
                .execute(self.conn)?;
        }
        Ok(())
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        // Nested calls become savepoints.
        AnsiTransactionManager::begin_transaction(self.conn)?;
        match f(self) {
            Ok(value) => match AnsiTransactionManager::commit_transaction(self.conn) {
                Ok(()) => Ok(value),
                Err(e) => {
                    if let Err(rollback) = AnsiTransactionManager::rollback_transaction(self.conn) {
                        tracing::error!(error = %rollback, "rollback after failed commit failed");
                    }
                    Err(e.into())
                }
            },
            Err(e) => {
                if let Err(rollback) = AnsiTransactionManager::rollback_transaction(self.conn) {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

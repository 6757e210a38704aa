/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::db::DbConn;
use crate::error::Result;
use crate::model::court::model::{
    AssignRequest, BlockReport, CompletionReport, CourtAssignment, FillReport, MatchRef,
    QueueReturn, ScheduleState,
};
use crate::model::court::scheduler;
use crate::model::court::store::PgStore;
use crate::model::kinds::{MatchKey, Stage};
use crate::model::signature::ChangeSignature;
use crate::model::sys::SysSettings;
use crate::model::utc_now as now;
use rocket::serde::json::Json;
use rocket::State;

/// # Schedule state for a stage
/// Every court with its lock and current match, the eligible queue in priority order, the
/// upcoming preview, blocked matches and debug counters. Invalid assignments are cleaned up
/// before the state is computed.
#[openapi(tag = "Schedule")]
#[get("/schedule/<stage>")]
pub(crate) async fn get_schedule(
    stage: Stage,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<ScheduleState>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::state(&mut PgStore::new(c), stage, &settings, now()))
        .await
        .map(Json)
}

/// # Change signature
/// Hashes of the active assignments and of the upcoming order. Poll this and refetch the
/// state only when a hash moves.
#[openapi(tag = "Schedule")]
#[get("/schedule/<stage>/signature")]
pub(crate) async fn get_signature(
    stage: Stage,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<ChangeSignature>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::state(&mut PgStore::new(c), stage, &settings, now()))
        .await
        .map(|state| Json(ChangeSignature::of(&state)))
}

/// # Assign a match to a court
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/assign", data = "<request>")]
pub(crate) async fn post_assign(
    stage: Stage,
    request: Json<AssignRequest>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<CourtAssignment>> {
    let settings = settings.inner().clone();
    let request = request.into_inner();
    let key = MatchKey {
        kind: request.kind,
        id: request.match_id,
    };
    conn.run(move |c| {
        scheduler::assign(&mut PgStore::new(c), stage, request.court, key, &settings, now())
    })
    .await
    .map(Json)
}

/// # Send a court's match back to the queue
/// With auto schedule on, the court is refilled straight away with the best match that can
/// start now.
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/court/<court>/queue")]
pub(crate) async fn post_back_to_queue(
    stage: Stage,
    court: i32,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<QueueReturn>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::back_to_queue(&mut PgStore::new(c), stage, court, &settings, now()))
        .await
        .map(Json)
}

/// # Mark a court's match completed
/// Only accepted once the match has a final result.
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/court/<court>/complete")]
pub(crate) async fn post_complete(
    stage: Stage,
    court: i32,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<CompletionReport>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::mark_completed(&mut PgStore::new(c), stage, court, &settings, now()))
        .await
        .map(Json)
}

#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/court/<court>/lock")]
pub(crate) async fn post_lock(
    stage: Stage,
    court: i32,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<Option<FillReport>>> {
    let settings = settings.inner().clone();
    conn.run(move |c| {
        scheduler::set_court_lock(&mut PgStore::new(c), stage, court, true, &settings, now())
    })
    .await
    .map(Json)
}

#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/court/<court>/unlock")]
pub(crate) async fn post_unlock(
    stage: Stage,
    court: i32,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<Option<FillReport>>> {
    let settings = settings.inner().clone();
    conn.run(move |c| {
        scheduler::set_court_lock(&mut PgStore::new(c), stage, court, false, &settings, now())
    })
    .await
    .map(Json)
}

/// # Force a match to the front
/// Forced matches keep the order they were forced in.
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/force", data = "<target>")]
pub(crate) async fn post_force(
    stage: Stage,
    target: Json<MatchRef>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<MatchKey>> {
    let settings = settings.inner().clone();
    let key = target.key();
    conn.run(move |c| scheduler::force(&mut PgStore::new(c), stage, key, &settings, now()))
        .await
        .map(|()| Json(key))
}

#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/unforce", data = "<target>")]
pub(crate) async fn post_unforce(
    stage: Stage,
    target: Json<MatchRef>,
    conn: DbConn,
) -> Result<Json<MatchKey>> {
    let key = target.key();
    conn.run(move |c| scheduler::unforce(&mut PgStore::new(c), stage, key))
        .await
        .map(|()| Json(key))
}

/// # Block a match
/// Pulls the match off any court and keeps it out of every queue until unblocked.
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/block", data = "<target>")]
pub(crate) async fn post_block(
    stage: Stage,
    target: Json<MatchRef>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<BlockReport>> {
    let settings = settings.inner().clone();
    let target = target.into_inner();
    let reason = target.reason.clone().unwrap_or_default();
    conn.run(move |c| {
        scheduler::block(&mut PgStore::new(c), stage, target.key(), &reason, &settings, now())
    })
    .await
    .map(Json)
}

#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/unblock", data = "<target>")]
pub(crate) async fn post_unblock(
    stage: Stage,
    target: Json<MatchRef>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<Option<FillReport>>> {
    let settings = settings.inner().clone();
    let key = target.key();
    conn.run(move |c| scheduler::unblock(&mut PgStore::new(c), stage, key, &settings, now()))
        .await
        .map(Json)
}

/// # Turn auto schedule on or off
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/auto?<enabled>")]
pub(crate) async fn post_auto(
    stage: Stage,
    enabled: bool,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<Option<FillReport>>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::set_auto(&mut PgStore::new(c), stage, enabled, &settings, now()))
        .await
        .map(Json)
}

/// # Fill free courts now
/// Runs the fill loop once regardless of the auto schedule flag.
#[openapi(tag = "Schedule")]
#[post("/schedule/<stage>/fill")]
pub(crate) async fn post_fill(
    stage: Stage,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<FillReport>> {
    let settings = settings.inner().clone();
    conn.run(move |c| scheduler::fill(&mut PgStore::new(c), stage, &settings, now()))
        .await
        .map(Json)
}

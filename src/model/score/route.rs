/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::db::DbConn;
use crate::error::Result;
use crate::model::kinds::{MatchKey, MatchKind};
use crate::model::score::model::{self, Game, ScoreOutcome, Side};
use crate::model::sys::SysSettings;
use crate::model::utc_now as now;
use rocket::serde::json::Json;
use rocket::State;
use schemars::JsonSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy)]
pub struct WalkoverRequest {
    /// Side that advances
    pub winner: Side,
}

/// # Record a game
/// The match is decided as soon as the games give a winner. Knockout winners are moved
/// forward in the same request.
#[openapi(tag = "Score")]
#[post("/match/<kind>/<id>/game", data = "<game>")]
pub(crate) async fn post_game(
    kind: MatchKind,
    id: Uuid,
    game: Json<Game>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<ScoreOutcome>> {
    let settings = settings.inner().clone();
    let game = game.into_inner();
    conn.run(move |c| model::record_game(MatchKey { kind, id }, game, &settings, now(), c))
        .await
        .map(Json)
}

/// # Undo the last game
/// Reopens the match. Anything downstream that depended on its winner is reset.
#[openapi(tag = "Score")]
#[post("/match/<kind>/<id>/undo")]
pub(crate) async fn post_undo(
    kind: MatchKind,
    id: Uuid,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<ScoreOutcome>> {
    let settings = settings.inner().clone();
    conn.run(move |c| model::undo_game(MatchKey { kind, id }, &settings, now(), c))
        .await
        .map(Json)
}

#[openapi(tag = "Score")]
#[post("/match/<kind>/<id>/walkover", data = "<request>")]
pub(crate) async fn post_walkover(
    kind: MatchKind,
    id: Uuid,
    request: Json<WalkoverRequest>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<ScoreOutcome>> {
    let settings = settings.inner().clone();
    let side = request.winner;
    conn.run(move |c| model::walkover(MatchKey { kind, id }, side, &settings, now(), c))
        .await
        .map(Json)
}

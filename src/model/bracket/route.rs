/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::db::DbConn;
use crate::error::Result;
use crate::model::bracket::model::{self, ClearedBracket, GenerateRequest, GeneratedBracket};
use crate::model::kinds::Series;
use crate::model::propagation::PropagationReport;
use crate::model::sys::SysSettings;
use crate::model::utc_now as now;
use rocket::serde::json::Json;
use rocket::State;

/// # Generate a knockout series
/// Seeds and pairs the series from the locked group standings. An unplayed series is
/// replaced; one with results must be cleared first.
#[openapi(tag = "Bracket")]
#[post("/bracket/<category>/<series>", data = "<request>", rank = 2)]
pub(crate) async fn post_bracket(
    category: String,
    series: Series,
    request: Json<GenerateRequest>,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<GeneratedBracket>> {
    let settings = settings.inner().clone();
    let second_chance = request.second_chance;
    conn.run(move |c| model::generate(&category, series, second_chance, &settings, now(), c))
        .await
        .map(Json)
}

/// # Clear a knockout series
/// Removes its matches and seeds and pulls any of them off court.
#[openapi(tag = "Bracket")]
#[delete("/bracket/<category>/<series>")]
pub(crate) async fn delete_bracket(
    category: String,
    series: Series,
    conn: DbConn,
) -> Result<Json<ClearedBracket>> {
    conn.run(move |c| model::clear(&category, series, now(), c))
        .await
        .map(Json)
}

/// # Publish a round
/// Published matches enter the knockout queue once both teams are known.
#[openapi(tag = "Bracket")]
#[post("/bracket/<category>/<series>/publish?<round>")]
pub(crate) async fn post_publish(
    category: String,
    series: Series,
    round: i32,
    conn: DbConn,
) -> Result<Json<usize>> {
    conn.run(move |c| model::publish_round(&category, series, round, c))
        .await
        .map(Json)
}

#[openapi(tag = "Bracket")]
#[post("/bracket/<category>/propagate")]
pub(crate) async fn post_propagate(
    category: String,
    settings: &State<SysSettings>,
    conn: DbConn,
) -> Result<Json<PropagationReport>> {
    let settings = settings.inner().clone();
    conn.run(move |c| model::propagate(&category, &settings, now(), c))
        .await
        .map(Json)
}

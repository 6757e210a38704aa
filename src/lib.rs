/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
#![allow(clippy::too_many_arguments)]
extern crate diesel;
#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate rocket_okapi;

mod catchers;
pub mod db;
mod error;
pub mod model;
mod schema;
pub mod telemetry;
pub use error::Error;

pub mod rocket_launcher {
    use crate::catchers;
    use crate::db::DbConn;
    use crate::model::sys::SysSettings;
    use crate::model::{bracket, court, score, sys};
    use rocket::{Build, Rocket, Route};
    use rocket_okapi::swagger_ui::{make_swagger_ui, SwaggerUIConfig};

    /// Every route served under /api, plus the generated openapi.json.
    pub fn api_routes() -> Vec<Route> {
        openapi_get_routes![
            court::route::get_schedule,
            court::route::get_signature,
            court::route::post_assign,
            court::route::post_back_to_queue,
            court::route::post_complete,
            court::route::post_lock,
            court::route::post_unlock,
            court::route::post_force,
            court::route::post_unforce,
            court::route::post_block,
            court::route::post_unblock,
            court::route::post_auto,
            court::route::post_fill,
            bracket::route::post_bracket,
            bracket::route::delete_bracket,
            bracket::route::post_publish,
            bracket::route::post_propagate,
            score::route::post_game,
            score::route::post_undo,
            score::route::post_walkover,
            sys::route::sysinfo,
        ]
    }

    pub fn launcher() -> Rocket<Build> {
        let saturn_v = rocket::build()
            .attach(DbConn::fairing())
            .register(
                "/",
                catchers![
                    catchers::not_found,
                    catchers::internal_error,
                    catchers::unprocessable
                ],
            )
            .mount("/api", api_routes())
            .mount(
                "/docs/",
                make_swagger_ui(&SwaggerUIConfig {
                    url: "../api/openapi.json".to_owned(),
                    ..Default::default()
                }),
            );

        let settings = SysSettings::from_figment(saturn_v.figment());
        saturn_v.manage(settings)
    }
}

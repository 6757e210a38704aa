/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use rocket::serde::json::Json;
use rocket::Request;

#[derive(Serialize, Deserialize)]
pub(crate) struct Httperror {
    pub(crate) status: u16,
    pub(crate) error: String,
}

#[catch(404)]
pub(crate) fn not_found(req: &Request<'_>) -> Json<Httperror> {
    Json(Httperror {
        status: 404,
        error: format!("no route for {}", req.uri()),
    })
}

/// Malformed path segments and bodies end up here.
#[catch(422)]
pub(crate) fn unprocessable() -> Json<Httperror> {
    Json(Httperror {
        status: 422,
        error: String::from("Unprocessable Entity"),
    })
}

#[catch(500)]
pub(crate) fn internal_error() -> Json<Httperror> {
    Json(Httperror {
        status: 500,
        error: String::from("Internal Server Error"),
    })
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::model::kinds::{MatchKey, Series};
use diesel::result::DatabaseErrorKind;
use okapi::openapi3::Responses;
use rocket::http::Status;
use rocket::response::{self, status::Custom, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use rocket_okapi::{gen::OpenApiGenerator, response::OpenApiResponderInner, OpenApiError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Diesel {
        #[from]
        source: diesel::result::Error,
    },
    #[error("NotFound Error")]
    NotFound {},

    #[error("Bad Request")]
    BadRequest {},

    // Preconditions. Nothing has been written when one of these is returned.
    #[error("group stage for {category} is not locked")]
    StageNotLocked { category: String },
    #[error("bracket {category}/{series} has results or a second chance series attached; clear those first")]
    BracketExists { category: String, series: Series },
    #[error("series A bracket for {category} must be generated first")]
    SeriesAMissing { category: String },
    #[error("series B has {count} teams, which is not a power of two; enable second chance play-ins")]
    SecondChanceRequired { count: usize },
    #[error(
        "with {losers} series A losers, second chance takes {min} to {max} series B teams \
         (one play-in per open quarterfinal seat at most), found {count}"
    )]
    SecondChanceSize {
        losers: usize,
        count: usize,
        min: usize,
        max: usize,
    },
    #[error("{category} has {count} ranked teams, at least {needed} are needed")]
    NotEnoughTeams {
        category: String,
        count: usize,
        needed: usize,
    },
    #[error("match {key} is not eligible for scheduling")]
    MatchNotEligible { key: MatchKey },
    #[error("match {key} is blocked")]
    MatchBlocked { key: MatchKey },
    #[error("court {court} is locked")]
    CourtLocked { court: i32 },
    #[error("court {court} is already playing a match")]
    CourtBusy { court: i32 },
    #[error("court {court} has no active match")]
    CourtEmpty { court: i32 },
    #[error("players already on court: {players:?}")]
    PlayersInPlay { players: Vec<Uuid> },
    #[error("result of {key} is not final")]
    ResultNotFinal { key: MatchKey },
    #[error("match {key} is already decided")]
    MatchDecided { key: MatchKey },
    #[error("match {key} has no result to undo")]
    NothingToUndo { key: MatchKey },
    #[error("match {key} does not have both teams yet")]
    MatchIncomplete { key: MatchKey },
    #[error("game {home}-{away} for match {key} is not a finished game")]
    GameUndecided { key: MatchKey, home: i32, away: i32 },

    // Concurrency conflicts.
    #[error("already assigned")]
    AlreadyAssigned {},

    // Integrity violations. The bracket must be cleared and regenerated.
    #[error("match {match_id} stores winner {stored:?} but its games give {derived:?}")]
    WinnerMismatch {
        match_id: Uuid,
        stored: Option<Uuid>,
        derived: Option<Uuid>,
    },
    #[error("second chance seat in {match_id} for {team} conflicts with {occupant:?}")]
    SecondChanceConflict {
        match_id: Uuid,
        team: Uuid,
        occupant: Option<Uuid>,
    },
}

pub type Result<T> = std::result::Result<T, crate::Error>;

pub trait MapRre<T> {
    fn map_rre(self) -> Result<T>;
}

impl<T, E> MapRre<T> for std::result::Result<T, E>
where
    Error: From<E>,
{
    fn map_rre(self) -> Result<T> {
        self.map_err(crate::Error::from)
    }
}

/// Turns a unique-constraint violation into `AlreadyAssigned`; anything else passes through.
pub(crate) fn map_unique(err: diesel::result::Error) -> Error {
    match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            Error::AlreadyAssigned {}
        }
        other => Error::from(other),
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ErrorBody {
    status: u16,
    error: String,
}

impl Error {
    pub fn not_found<T>() -> std::result::Result<T, Error> {
        std::result::Result::Err(Error::NotFound {})
    }

    /// Integrity violations abort a propagation pass and are never auto-corrected.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::WinnerMismatch { .. } | Error::SecondChanceConflict { .. }
        )
    }

    pub fn status(&self) -> Status {
        match self {
            Error::NotFound {} => Status::NotFound,
            Error::BadRequest {} => Status::BadRequest,
            Error::AlreadyAssigned {} | Error::CourtBusy { .. } | Error::BracketExists { .. } => {
                Status::Conflict
            }
            Error::Diesel { .. } | Error::WinnerMismatch { .. } | Error::SecondChanceConflict { .. } => {
                Status::InternalServerError
            }
            _ => Status::BadRequest,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status == Status::InternalServerError {
            tracing::error!(error = %self, "request failed");
        }
        Custom(
            status,
            Json(ErrorBody {
                status: status.code,
                error: self.to_string(),
            }),
        )
        .respond_to(req)
    }
}

impl OpenApiResponderInner for Error {
    fn responses(
        _generator: &mut OpenApiGenerator,
    ) -> std::result::Result<Responses, OpenApiError> {
        Ok(Default::default())
    }
}

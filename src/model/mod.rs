/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use chrono::{NaiveDateTime, Utc};

pub mod bracket;
pub mod court;
pub mod draw;
pub mod fairness;
pub mod kinds;
pub mod pool;
pub mod propagation;
pub mod queue;
pub mod score;
pub mod seeding;
pub mod signature;
pub mod sys;

/// Timestamps are stored as naive UTC.
pub(crate) fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

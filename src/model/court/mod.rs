/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
pub mod model;
pub mod route;
pub mod scheduler;
pub mod store;
pub use model::*;
pub use store::{PgStore, ScheduleStore};

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::model::kinds::ScoringMode;
use crate::model::sys::SysSettings;
use rocket::serde::json::Json;
use rocket::State;
use schemars::JsonSchema;

/// # System Information
/// Gives the build version and the scoring configuration in effect.
#[openapi(tag = "System")]
#[get("/sys/info")]
pub(crate) async fn sysinfo(settings: &State<SysSettings>) -> Json<PubSysInfo> {
    Json(PubSysInfo::new(settings))
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct PubSysInfo {
    pub(crate) version: String,
    pub(crate) name: String,
    pub(crate) scoring_mode: ScoringMode,
    pub(crate) upcoming_limit: usize,
}

impl PubSysInfo {
    pub(crate) fn new(settings: &SysSettings) -> PubSysInfo {
        PubSysInfo {
            version: git_version::git_version!(
                fallback = option_env!("GIT_HASH").unwrap_or(env!("CARGO_PKG_VERSION"))
            )
            .to_string(),
            name: settings.name.clone(),
            scoring_mode: settings.scoring_mode,
            upcoming_limit: settings.upcoming_limit,
        }
    }
}

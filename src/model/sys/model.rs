/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::model::kinds::ScoringMode;
use crate::model::score::ScoringRules;
use rocket::figment::Figment;
use schemars::JsonSchema;

/// Engine settings, read from the `courtside` table of the Rocket figment.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
#[serde(default)]
pub struct SysSettings {
    pub name: String,
    /// Single game or best of three
    pub scoring_mode: ScoringMode,
    /// Points needed to take a game (with a two point lead)
    pub game_points: i32,
    /// Score at which a game ends regardless of the lead
    pub game_cap: i32,
    /// Length of the upcoming preview
    pub upcoming_limit: usize,
    /// How many recently completed matches count against rest
    pub recent_window: usize,
    pub fill_max_passes: usize,
    pub propagation_max_passes: usize,
    /// Categories that send only their top 4 to Series A
    pub reduced_categories: Vec<String>,
    /// `tracing` env-filter directive
    pub log_filter: String,
}

impl Default for SysSettings {
    fn default() -> SysSettings {
        SysSettings {
            name: String::from("Courtside Local"),
            scoring_mode: ScoringMode::BestOfThree,
            game_points: 21,
            game_cap: 30,
            upcoming_limit: 5,
            recent_window: 5,
            fill_max_passes: 10,
            propagation_max_passes: 5,
            reduced_categories: Vec::new(),
            log_filter: String::from("info"),
        }
    }
}

impl SysSettings {
    pub fn from_figment(figment: &Figment) -> SysSettings {
        match figment.extract_inner::<SysSettings>("courtside") {
            Ok(settings) => settings,
            Err(e) => {
                // Logging may not be up yet, so this goes to stderr as well.
                eprintln!("No usable [courtside] settings ({e}); using defaults");
                SysSettings::default()
            }
        }
    }

    pub fn rules(&self) -> ScoringRules {
        ScoringRules {
            mode: self.scoring_mode,
            points: self.game_points,
            cap: self.game_cap,
        }
    }

    pub fn series_a_size(&self, category: &str) -> usize {
        if self.reduced_categories.iter().any(|c| c == category) {
            4
        } else {
            8
        }
    }
}

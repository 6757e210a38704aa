/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use rocket::request::FromParam;
use schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// # Stage
/// Scheduling context. Each stage keeps its own court bookkeeping.
#[derive(
    diesel_derive_enum::DbEnum,
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[ExistingTypePath = "crate::schema::sql_types::Stage"]
#[DbValueStyle = "SCREAMING_SNAKE_CASE"]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Group,
    Knockout,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Group, Stage::Knockout];
}

/// # Match Kind
/// Which match table a reference points into.
#[derive(
    diesel_derive_enum::DbEnum,
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[ExistingTypePath = "crate::schema::sql_types::MatchKind"]
#[DbValueStyle = "SCREAMING_SNAKE_CASE"]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    Group,
    Knockout,
}

#[derive(
    diesel_derive_enum::DbEnum,
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[ExistingTypePath = "crate::schema::sql_types::MatchStatus"]
#[DbValueStyle = "SCREAMING_SNAKE_CASE"]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    Completed,
    Walkover,
}

#[derive(
    diesel_derive_enum::DbEnum,
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[ExistingTypePath = "crate::schema::sql_types::AssignmentStatus"]
#[DbValueStyle = "SCREAMING_SNAKE_CASE"]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    /// Court is currently playing this match
    Active,
    /// Match finished on this court, or the row was invalidated
    Cleared,
    /// Match was sent back to the queue or pulled off court
    Canceled,
}

/// # Series
/// Two parallel knockout brackets per category. `A` holds the top qualifiers.
#[derive(
    diesel_derive_enum::DbEnum,
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[ExistingTypePath = "crate::schema::sql_types::Series"]
#[DbValueStyle = "SCREAMING_SNAKE_CASE"]
pub enum Series {
    A,
    B,
}

/// Downstream seat a winner (or second chance loser) flows into.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Home,
    Away,
}

impl Slot {
    pub fn from_db(value: i32) -> Option<Slot> {
        match value {
            1 => Some(Slot::Home),
            2 => Some(Slot::Away),
            _ => None,
        }
    }

    pub fn to_db(self) -> i32 {
        match self {
            Slot::Home => 1,
            Slot::Away => 2,
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    SingleGame,
    BestOfThree,
}

/// # Match Key
/// A reference to either a group match or a knockout match.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub kind: MatchKind,
    pub id: Uuid,
}

impl MatchKey {
    pub fn group(id: Uuid) -> Self {
        MatchKey {
            kind: MatchKind::Group,
            id,
        }
    }

    pub fn knockout(id: Uuid) -> Self {
        MatchKey {
            kind: MatchKind::Knockout,
            id,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Group => f.write_str("GROUP"),
            Stage::Knockout => f.write_str("KNOCKOUT"),
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Group => f.write_str("GROUP"),
            MatchKind::Knockout => f.write_str("KNOCKOUT"),
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Series::A => f.write_str("A"),
            Series::B => f.write_str("B"),
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GROUP" => Ok(Stage::Group),
            "KNOCKOUT" => Ok(Stage::Knockout),
            _ => Err(()),
        }
    }
}

impl FromStr for MatchKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GROUP" => Ok(MatchKind::Group),
            "KNOCKOUT" => Ok(MatchKind::Knockout),
            _ => Err(()),
        }
    }
}

impl FromStr for Series {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Series::A),
            "B" => Ok(Series::B),
            _ => Err(()),
        }
    }
}

impl<'r> FromParam<'r> for Stage {
    type Error = &'r str;

    fn from_param(param: &'r str) -> std::result::Result<Self, Self::Error> {
        param.parse().map_err(|_| param)
    }
}

impl<'r> FromParam<'r> for MatchKind {
    type Error = &'r str;

    fn from_param(param: &'r str) -> std::result::Result<Self, Self::Error> {
        param.parse().map_err(|_| param)
    }
}

impl<'r> FromParam<'r> for Series {
    type Error = &'r str;

    fn from_param(param: &'r str) -> std::result::Result<Self, Self::Error> {
        param.parse().map_err(|_| param)
    }
}

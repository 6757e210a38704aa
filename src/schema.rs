/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

pub mod sql_types {
    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "stage"))]
    pub struct Stage;

    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "match_kind"))]
    pub struct MatchKind;

    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "match_status"))]
    pub struct MatchStatus;

    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "assignment_status"))]
    pub struct AssignmentStatus;

    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "series"))]
    pub struct Series;
}

diesel::table! {
    court (id) {
        id -> Int4,
        label -> Text,
        sort_order -> Int4,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::Stage;

    court_lock (court_id, stage) {
        court_id -> Int4,
        stage -> Stage,
        created -> Timestamp,
    }
}

diesel::table! {
    team_member (team_id, player_id) {
        team_id -> Uuid,
        player_id -> Uuid,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::{MatchStatus, Stage};

    group_match (id) {
        id -> Uuid,
        stage -> Stage,
        category -> Text,
        group_id -> Uuid,
        status -> MatchStatus,
        home_team -> Nullable<Uuid>,
        away_team -> Nullable<Uuid>,
        winner -> Nullable<Uuid>,
        home_games -> Array<Int4>,
        away_games -> Array<Int4>,
        completed_at -> Nullable<Timestamp>,
        created -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::{MatchStatus, Series};

    knockout_match (id) {
        id -> Uuid,
        category -> Text,
        series -> Series,
        round -> Int4,
        match_no -> Int4,
        published -> Bool,
        status -> MatchStatus,
        home_team -> Nullable<Uuid>,
        away_team -> Nullable<Uuid>,
        winner -> Nullable<Uuid>,
        next_match_id -> Nullable<Uuid>,
        next_slot -> Nullable<Int4>,
        loser_next_match_id -> Nullable<Uuid>,
        loser_next_slot -> Nullable<Int4>,
        home_games -> Array<Int4>,
        away_games -> Array<Int4>,
        completed_at -> Nullable<Timestamp>,
        created -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::{AssignmentStatus, MatchKind, Stage};

    court_assignment (id) {
        id -> Uuid,
        court_id -> Int4,
        stage -> Stage,
        match_kind -> MatchKind,
        group_match_id -> Nullable<Uuid>,
        knockout_match_id -> Nullable<Uuid>,
        status -> AssignmentStatus,
        assigned_at -> Timestamp,
        cleared_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::{MatchKind, Stage};

    forced_priority (id) {
        id -> Int4,
        stage -> Stage,
        match_kind -> MatchKind,
        match_id -> Uuid,
        created -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::MatchKind;

    blocked_match (match_kind, match_id) {
        match_kind -> MatchKind,
        match_id -> Uuid,
        reason -> Text,
        created -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::Stage;

    schedule_config (stage) {
        stage -> Stage,
        auto_schedule -> Bool,
        updated -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::{MatchKind, Stage};

    last_batch_entry (stage, position) {
        stage -> Stage,
        position -> Int4,
        match_kind -> MatchKind,
        match_id -> Uuid,
        player_ids -> Array<Uuid>,
        assigned_at -> Timestamp,
    }
}

diesel::table! {
    random_draw (draw_key) {
        draw_key -> Text,
        draw_order -> Array<Uuid>,
        created -> Timestamp,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::Series;

    seed (category, series, seed_no) {
        category -> Text,
        series -> Series,
        team_id -> Uuid,
        seed_no -> Int4,
    }
}

diesel::table! {
    group_standing (category, team_id) {
        category -> Text,
        team_id -> Uuid,
        group_id -> Uuid,
        group_rank -> Int4,
        metric -> Int4,
        points_against -> Float8,
    }
}

diesel::table! {
    group_stage_lock (category) {
        category -> Text,
        locked_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    court,
    court_lock,
    court_assignment,
    team_member,
    group_match,
    knockout_match,
    forced_priority,
    blocked_match,
    schedule_config,
    last_batch_entry,
    random_draw,
    seed,
    group_standing,
    group_stage_lock,
);

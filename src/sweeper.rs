/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
//! Periodic maintenance pass. Meant to run from cron or a systemd timer next to the server.
//!
//! Per stage: close stale assignments, then fill free courts if auto schedule is on.
//! Per category: re-run bracket propagation so missed moves are repaired.
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rust_courtside::model::bracket;
use rust_courtside::model::court::{scheduler, PgStore, ScheduleStore};
use rust_courtside::model::kinds::Stage;
use rust_courtside::model::sys::SysSettings;
use rust_courtside::telemetry::init_tracing;
use rust_courtside::Error;

#[derive(Debug, thiserror::Error)]
enum SweepError {
    #[error("database not set in configuration: {0}")]
    Config(#[from] rocket::figment::Error),
    #[error(transparent)]
    Connect(#[from] diesel::ConnectionError),
    #[error(transparent)]
    Engine(#[from] Error),
}

fn establish_connection() -> Result<PgConnection, SweepError> {
    // Rocket figment gives us the information we need, then we discard it
    let database_url: String = rocket::Config::figment().extract_inner("databases.postgres_global.url")?;
    Ok(PgConnection::establish(&database_url)?)
}

fn runtime(settings: &SysSettings) -> Result<(), SweepError> {
    let mut conn = establish_connection()?;
    let now = Utc::now().naive_utc();
    for stage in Stage::ALL {
        let mut store = PgStore::new(&mut conn);
        let report = scheduler::reconcile(&mut store, stage, settings, now)?;
        tracing::debug!(%stage, ?report, "reconciled");
        if store.snapshot(stage, settings.recent_window)?.config.auto_schedule {
            scheduler::fill(&mut store, stage, settings, now)?;
        }
    }
    let mut failed = 0;
    for category in bracket::categories(&mut conn)? {
        match bracket::propagate(&category, settings, now, &mut conn) {
            Ok(report) if !report.converged => {
                tracing::warn!(%category, passes = report.passes, "propagation did not settle");
            }
            Ok(_) => {}
            // Keep going: one broken bracket must not hold up the others.
            Err(e) => {
                tracing::error!(%category, error = %e, "propagation failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        tracing::warn!(failed, "some brackets need to be cleared and regenerated");
    }
    Ok(())
}

fn main() {
    use std::time::Instant;
    let settings = SysSettings::from_figment(&rocket::Config::figment());
    init_tracing(&settings.log_filter);
    let now = Instant::now();
    let state = runtime(&settings);
    let elapsed = now.elapsed();
    println!("Elapsed: {elapsed:.2?}");
    std::process::exit(match state {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    });
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use rust_courtside::model::sys::SysSettings;
use rust_courtside::rocket_launcher::launcher;
use rust_courtside::telemetry::init_tracing;

#[rocket::launch]
fn rocket() -> _ {
    let settings = SysSettings::from_figment(&rocket::Config::figment());
    init_tracing(&settings.log_filter);
    launcher()
}

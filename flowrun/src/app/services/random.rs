// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use rand::Rng;
use time::OffsetDateTime;
use time::macros::format_description;

const SUFFIX_LEN: usize = 4;

/// `run_YYYYMMDD_HHMMSS_xxxx`; the letters keep two uploads in the same second apart.
pub fn generate_run_name(now: OffsetDateTime) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..26);
            (b'a' + idx) as char
        })
        .collect();
    format!("{}_{}", run_name_stamp(now), suffix)
}

fn run_name_stamp(now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("run_{stamp}")
}

// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod cli;
pub mod discovery;
pub mod fs;
pub mod process;
pub mod store;
pub mod time;

// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod listing;
pub mod path_mapping;
pub mod paths;
pub mod random;
pub mod sbatch;
pub mod shell;
pub mod slurm;
pub mod transport;

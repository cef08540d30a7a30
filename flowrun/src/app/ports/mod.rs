// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod command_runner;
pub mod input_discovery;
pub mod local_fs;
pub mod run_store;

pub use clock::ClockPort;
pub use command_runner::CommandRunnerPort;
pub use input_discovery::InputDiscoveryPort;
pub use local_fs::LocalFilesystemPort;
pub use run_store::{RunLock, RunStorePort};

// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const COMMAND_FAILED: &str = "command_failed";
    pub const SSH_NON_INTERACTIVE: &str = "ssh_non_interactive";
    pub const MALFORMED_LISTING: &str = "malformed_listing";
    pub const UNPARSEABLE_SUBMISSION: &str = "unparseable_submission";
    pub const NOT_STAGED: &str = "not_staged";
    pub const NO_JOBS: &str = "no_jobs";
    pub const ALREADY_SUBMITTED: &str = "already_submitted";
    pub const DISCOVERY_ERROR: &str = "discovery_error";
    pub const STAGING_ERROR: &str = "staging_error";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const LOCAL_ERROR: &str = "local_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const BUSY: &str = "busy";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Remote command exited non-zero or could not be spawned.
    Transport,
    /// Remote output did not have the expected structure.
    Parse,
    /// Operation invoked out of order.
    FailedPrecondition,
    InvalidArgument,
    Local,
    Internal,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

pub fn invalid_argument(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::InvalidArgument,
        codes::INVALID_ARGUMENT,
        message,
    )
}

pub fn local_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Local, codes::LOCAL_ERROR, message)
}

pub fn staging_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Local, codes::STAGING_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_message() {
        let err = AppError::with_message(AppErrorKind::Parse, codes::MALFORMED_LISTING, "bad");
        assert_eq!(err.to_string(), "bad");
        assert_eq!(err.code(), codes::MALFORMED_LISTING);
    }

    #[test]
    fn helpers_pick_kind_and_code() {
        let err = staging_error("no bundle");
        assert_eq!(err.kind(), AppErrorKind::Local);
        assert_eq!(err.code(), codes::STAGING_ERROR);
        assert_eq!(invalid_argument("x").kind(), AppErrorKind::InvalidArgument);
        assert_eq!(local_error("x").code(), codes::LOCAL_ERROR);
    }
}

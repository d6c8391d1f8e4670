// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("TaskBuilder::build was already called on this builder")]
    BuilderExhausted,

    #[error("pool is shutting down and no longer accepts submissions")]
    SubmissionClosed,

    #[error("task callable failed: {0}")]
    TaskCallableFailed(String),

    #[error("thread pool destroyed while {0} task list(s) were still active")]
    DestroyedWhileActive(usize),
}

// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::io;

pub type Result<T, E = IpcError> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IpcError {
    #[error("name must not be empty")]
    InvalidName,

    #[error(transparent)]
    Io(#[from] io::Error),
}

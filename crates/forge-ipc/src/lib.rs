// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Cross-process pipes and shared-memory mappings.

mod error;
pub mod pipe;
pub mod shm;

pub use error::{IpcError, Result};
pub use pipe::{anonymous_pipe, NamedPipe, PipeReader, PipeWriter};
pub use shm::{ConstMapping, Mapping, SharedMemory};

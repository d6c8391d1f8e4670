// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Named, cross-process mutexes and semaphores, plus a plain in-process
//! counting semaphore.

mod error;
mod mutex;
mod platform;
mod semaphore;

pub use error::{Result, SyncError};
pub use mutex::{NamedMutex, NamedMutexGuard};
pub use semaphore::{AnonymousSemaphore, NamedSemaphore};

// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Anonymous and named pipes. A named pipe's OS-level name is namespaced
//! internally (`\\.\pipe\` on Windows, a `/tmp/forge-ipc/` FIFO directory
//! on Unix) so callers only ever deal in plain logical names.

use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
};

use crate::error::{IpcError, Result};

const STREAM_BUFFER_SIZE: usize = 1024;

/// The read half of a pipe, buffered in 1024-byte chunks.
pub struct PipeReader {
    file: File,
}

impl PipeReader {
    fn new(file: File) -> Self {
        Self { file }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// The write half of a pipe, buffered in 1024-byte chunks and flushed when
/// dropped.
pub struct PipeWriter {
    inner: Option<BufWriter<File>>,
}

impl PipeWriter {
    fn new(file: File) -> Self {
        Self {
            inner: Some(BufWriter::with_capacity(STREAM_BUFFER_SIZE, file)),
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .expect("PipeWriter used after drop")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .expect("PipeWriter used after drop")
            .flush()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.inner.take() {
            if let Err(err) = writer.flush() {
                tracing::warn!(%err, "failed to flush pipe writer on drop");
            }
        }
    }
}

/// Validates a logical pipe name: non-empty, and free of path separators
/// that would escape the namespace prefix.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(IpcError::InvalidName);
    }
    Ok(())
}

/// A named, bidirectional-by-convention pipe: one side `create`s it, the
/// other `open`s it by the same logical name.
pub struct NamedPipe {
    reader: PipeReader,
    writer: PipeWriter,
}

impl NamedPipe {
    pub fn reader(&mut self) -> &mut PipeReader {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut PipeWriter {
        &mut self.writer
    }
}

#[cfg(unix)]
mod platform {
    use std::{fs::OpenOptions, os::unix::io::FromRawFd, path::PathBuf};

    use super::*;

    pub fn anonymous_pipe() -> Result<(PipeReader, PipeWriter)> {
        let mut fds = [0i32; 2];
        let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if result != 0 {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        let reader = unsafe { File::from_raw_fd(read_fd) };
        let writer = unsafe { File::from_raw_fd(write_fd) };
        Ok((PipeReader::new(reader), PipeWriter::new(writer)))
    }

    fn namespaced_path(name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        let dir = std::env::temp_dir().join("forge-ipc");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(name))
    }

    pub fn create(name: &str) -> Result<NamedPipe> {
        let path = namespaced_path(name)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::from_bits_truncate(0o600))
            .map_err(|errno| IpcError::Io(io::Error::from_raw_os_error(errno as i32)))?;

        let write_handle = OpenOptions::new().write(true).open(&path)?;
        let read_handle = OpenOptions::new().read(true).open(&path)?;
        Ok(NamedPipe {
            reader: PipeReader::new(read_handle),
            writer: PipeWriter::new(write_handle),
        })
    }

    pub fn open(name: &str) -> Result<NamedPipe> {
        let path = namespaced_path(name)?;
        let read_handle = OpenOptions::new().read(true).open(&path)?;
        let write_handle = OpenOptions::new().write(true).open(&path)?;
        Ok(NamedPipe {
            reader: PipeReader::new(read_handle),
            writer: PipeWriter::new(write_handle),
        })
    }
}

#[cfg(windows)]
mod platform {
    use std::os::windows::io::FromRawHandle;

    use windows_sys::Win32::{
        Foundation::{GENERIC_READ, GENERIC_WRITE, INVALID_HANDLE_VALUE},
        Storage::FileSystem::{CreateFileW, OPEN_EXISTING},
        System::Pipes::{CreateNamedPipeW, CreatePipe, PIPE_ACCESS_DUPLEX, PIPE_TYPE_BYTE},
    };

    use super::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub fn anonymous_pipe() -> Result<(PipeReader, PipeWriter)> {
        let mut read_handle = std::ptr::null_mut();
        let mut write_handle = std::ptr::null_mut();
        let ok = unsafe { CreatePipe(&mut read_handle, &mut write_handle, std::ptr::null(), 0) };
        if ok == 0 {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let reader = unsafe { File::from_raw_handle(read_handle as _) };
        let writer = unsafe { File::from_raw_handle(write_handle as _) };
        Ok((PipeReader::new(reader), PipeWriter::new(writer)))
    }

    fn pipe_name(name: &str) -> Result<String> {
        validate_name(name)?;
        Ok(format!(r"\\.\pipe\{name}"))
    }

    pub fn create(name: &str) -> Result<NamedPipe> {
        let wide_name = wide(&pipe_name(name)?);
        let handle = unsafe {
            CreateNamedPipeW(
                wide_name.as_ptr(),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_BYTE,
                1,
                STREAM_BUFFER_SIZE as u32,
                STREAM_BUFFER_SIZE as u32,
                0,
                std::ptr::null(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let read_file = unsafe { File::from_raw_handle(handle as _) };
        let write_file = read_file.try_clone()?;
        Ok(NamedPipe {
            reader: PipeReader::new(read_file),
            writer: PipeWriter::new(write_file),
        })
    }

    pub fn open(name: &str) -> Result<NamedPipe> {
        let wide_name = wide(&pipe_name(name)?);
        let handle = unsafe {
            CreateFileW(
                wide_name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                0,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let read_file = unsafe { File::from_raw_handle(handle as _) };
        let write_file = read_file.try_clone()?;
        Ok(NamedPipe {
            reader: PipeReader::new(read_file),
            writer: PipeWriter::new(write_file),
        })
    }
}

/// Creates an anonymous, unnamed pipe pair.
pub fn anonymous_pipe() -> Result<(PipeReader, PipeWriter)> {
    platform::anonymous_pipe()
}

impl NamedPipe {
    /// Creates a new named pipe, to be `open`ed by its counterpart.
    pub fn create(name: &str) -> Result<Self> {
        platform::create(name)
    }

    /// Opens a named pipe previously created by [`NamedPipe::create`].
    pub fn open(name: &str) -> Result<Self> {
        platform::open(name)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn anonymous_pipe_round_trips_bytes() {
        let (mut reader, mut writer) = anonymous_pipe().unwrap();
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        drop(writer);
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(NamedPipe::create(""), Err(IpcError::InvalidName)));
    }
}

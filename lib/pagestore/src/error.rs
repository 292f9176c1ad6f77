// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed errors surfaced by the page store.
//!
//! Integrity violations (header mismatch, CRC mismatch) and I/O failures
//! are distinct variants so callers can decide recovery; policy-level
//! races never reach this type.

/// Errors that can occur while operating on a [`crate::FilePageStore`].
#[derive(Debug, thiserror::Error)]
pub enum PageStoreError {
    /// The file does not start with the page store signature.
    #[error("failed to verify store file (invalid file signature) [expected={expected:#018x}, actual={actual:#018x}]")]
    InvalidSignature { expected: u64, actual: u64 },

    /// The file was written by an incompatible format version.
    #[error("failed to verify store file (invalid file version) [expected={expected}, actual={actual}]")]
    InvalidVersion { expected: u32, actual: u32 },

    /// The file header type does not match the configured store type.
    #[error("failed to verify store file (invalid file type) [expected={expected}, actual={actual}]")]
    InvalidType { expected: u8, actual: u8 },

    /// The file header page size does not match the configured page size.
    #[error("failed to verify store file (invalid page size) [expected={expected}, actual={actual}]")]
    InvalidPageSize { expected: u32, actual: u32 },

    /// The file length is not header-plus-whole-pages.
    #[error("failed to verify store file (invalid file size) [file_size={file_size}, page_size={page_size}]")]
    InvalidFileSize { file_size: u64, page_size: u32 },

    /// A page failed CRC validation on read.
    #[error("failed to read page (CRC validation failed) [page_id={page_id:#x}, offset={offset}, saved_crc={saved_crc:#010x}, cur_crc={cur_crc:#010x}]")]
    CrcMismatch {
        page_id: u64,
        offset: u64,
        saved_crc: u32,
        cur_crc: u32,
    },

    /// The store was stopped while an operation was in flight.
    #[error("page store is stopped")]
    Stopped,

    /// An underlying I/O operation failed.
    #[error("page store {op} failed")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PageStoreError {
    pub(crate) fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }

    /// True for header and CRC integrity violations, false for plain I/O
    /// failures.
    pub fn is_integrity(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Stopped)
    }
}

pub type Result<T> = std::result::Result<T, PageStoreError>;

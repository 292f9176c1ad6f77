// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! File-backed page store.
//!
//! One [`FilePageStore`] owns one file: a typed header, a reserved super
//! page, then append-allocated pages. Lifecycle operations (init, stop,
//! truncate, recover toggles, sync) run under the write side of the
//! lifecycle lock; page writes share the read side so they can proceed
//! concurrently with each other; page reads take the read side only to pin
//! the file handle open.
//!
//! Allocation is a lock-free CAS bump of the `allocated` byte watermark;
//! no file extension happens at allocation time, the file grows on first
//! write. The `tag` epoch set by [`FilePageStore::truncate`] silently
//! discards writes issued by stale writers from before the reset.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{PageStoreError, Result};
use crate::header::FileHeader;
use crate::{page_id, page_io, HEADER_SIZE};

/// Environment variable that disables CRC computation and verification.
pub const SKIP_CRC_ENV: &str = "GRIDFLOW_PDS_SKIP_CRC";

pub struct FilePageStore {
    path: PathBuf,
    ty: u8,
    page_size: u32,

    /// Lifecycle lock; `None` until first init and after stop.
    file: RwLock<Option<File>>,

    /// Byte watermark of allocated space, header included.
    allocated: AtomicU64,

    inited: AtomicBool,
    recover: AtomicBool,

    /// Truncation epoch; writes carrying a smaller epoch are dropped.
    tag: AtomicI32,

    skip_crc: bool,
}

impl FilePageStore {
    pub fn new(path: impl Into<PathBuf>, ty: u8, page_size: u32) -> Self {
        assert!(page_size > page_io::CRC_OFF as u32 + 4);

        Self {
            path: path.into(),
            ty,
            page_size,
            file: RwLock::new(None),
            allocated: AtomicU64::new(0),
            inited: AtomicBool::new(false),
            recover: AtomicBool::new(false),
            tag: AtomicI32::new(0),
            skip_crc: skip_crc_from_env(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// True iff the store file exists and holds more than a bare header.
    pub fn exists(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() > HEADER_SIZE)
            .unwrap_or(false)
    }

    /// Force initialization of the store file.
    pub fn ensure(&self) -> Result<()> {
        self.init()
    }

    /// Stop the store, optionally deleting the backing file.
    ///
    /// A stopped store re-initializes on the next operation.
    pub fn stop(&self, clean_file: bool) -> Result<()> {
        let mut slot = self.file.write();

        if !self.inited.load(Ordering::Acquire) {
            return Ok(());
        }

        if let Some(file) = slot.take() {
            file.sync_data().map_err(|e| PageStoreError::io("sync", e))?;
        }

        self.inited.store(false, Ordering::Release);

        if clean_file {
            std::fs::remove_file(&self.path).map_err(|e| PageStoreError::io("delete", e))?;
        }

        Ok(())
    }

    /// Reset the file to an empty page space under a new truncation epoch.
    ///
    /// Writers still carrying an older epoch become no-ops.
    pub fn truncate(&self, new_tag: i32) -> Result<()> {
        let slot = self.file.write();

        if !self.inited.load(Ordering::Acquire) {
            return Ok(());
        }

        self.tag.store(new_tag, Ordering::Release);

        let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

        file.set_len(0).map_err(|e| PageStoreError::io("truncate", e))?;

        let allocated = self.init_file(file)?;

        self.allocated.store(allocated, Ordering::Release);

        Ok(())
    }

    /// Enter recovery mode: the offset range check on writes is lifted so
    /// replayed pages can land past the current watermark.
    pub fn begin_recover(&self) {
        let _slot = self.file.write();

        self.recover.store(true, Ordering::Release);
    }

    /// Leave recovery mode, reconciling the watermark with the file size.
    pub fn finish_recover(&self) -> Result<()> {
        let slot = self.file.write();

        if self.inited.load(Ordering::Acquire) {
            let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

            let len = file
                .metadata()
                .map_err(|e| PageStoreError::io("stat", e))?
                .len();

            self.allocated.store(len, Ordering::Release);
        }

        self.recover.store(false, Ordering::Release);

        Ok(())
    }

    /// Read one page into `page_buf`, verifying its CRC.
    ///
    /// `page_buf` must be exactly one page long. A page past the end of
    /// the written file reads back zero-filled. On return the CRC slot of
    /// `page_buf` is zero, unless `keep_crc` asked for the stored value.
    pub fn read(&self, page_id: u64, page_buf: &mut [u8], keep_crc: bool) -> Result<()> {
        self.init()?;

        let slot = self.file.read();
        let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

        assert_eq!(page_buf.len(), self.page_size as usize);

        let off = self.page_offset(page_id);

        let mut filled = 0usize;

        while filled < page_buf.len() {
            let n = file
                .read_at(&mut page_buf[filled..], off + filled as u64)
                .map_err(|e| PageStoreError::io("read", e))?;

            // Unwritten page: nothing on disk past this point.
            if n == 0 {
                page_buf[filled..].fill(0);

                return Ok(());
            }

            filled += n;
        }

        let saved_crc = page_io::get_crc(page_buf);

        page_io::set_crc(page_buf, 0);

        if !self.skip_crc {
            let cur_crc = crc32fast::hash(page_buf);

            if saved_crc != cur_crc {
                return Err(PageStoreError::CrcMismatch {
                    page_id,
                    offset: off,
                    saved_crc,
                    cur_crc,
                });
            }
        }

        debug_assert_eq!(page_io::get_crc(page_buf), 0);

        if keep_crc {
            page_io::set_crc(page_buf, saved_crc);
        }

        Ok(())
    }

    /// Read up to [`HEADER_SIZE`] bytes from offset 0 into `buf`.
    ///
    /// Short reads at end of file are tolerated.
    pub fn read_header(&self, buf: &mut [u8]) -> Result<()> {
        self.init()?;

        let slot = self.file.read();
        let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

        assert_eq!(buf.len() as u64, HEADER_SIZE);

        let mut filled = 0usize;

        while filled < buf.len() {
            let n = file
                .read_at(&mut buf[filled..], filled as u64)
                .map_err(|e| PageStoreError::io("read", e))?;

            if n == 0 {
                return Ok(());
            }

            filled += n;
        }

        Ok(())
    }

    /// Write one page, stamping its CRC slot.
    ///
    /// `page_buf` must be exactly one page long with a zeroed CRC slot;
    /// the slot is zero again when this returns. A `tag` older than the
    /// current truncation epoch makes the call a silent no-op.
    pub fn write(&self, page_id: u64, page_buf: &mut [u8], tag: i32) -> Result<()> {
        self.init()?;

        let slot = self.file.read();
        let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

        // Stale writer from before a truncate.
        if tag < self.tag.load(Ordering::Acquire) {
            return Ok(());
        }

        let off = self.page_offset(page_id);

        assert!(
            off + self.page_size as u64 <= self.allocated.load(Ordering::Acquire) + HEADER_SIZE
                || self.recover.load(Ordering::Acquire),
            "write past allocated space [off={off:#x}, allocated={:#x}, page_id={page_id:#x}]",
            self.allocated.load(Ordering::Acquire),
        );

        assert_eq!(page_buf.len(), self.page_size as usize);
        assert_eq!(page_io::get_crc(page_buf), 0, "dirty CRC slot [page_id={page_id:#x}]");

        let crc = if self.skip_crc {
            0
        } else {
            crc32fast::hash(page_buf)
        };

        page_io::set_crc(page_buf, crc);

        let res = file.write_all_at(page_buf, off);

        // Callers observe a zero CRC slot on their buffer after the write,
        // error or not.
        page_io::set_crc(page_buf, 0);

        res.map_err(|e| PageStoreError::io("write", e))
    }

    /// Flush written pages to the device (data only, no file metadata).
    pub fn sync(&self) -> Result<()> {
        let mut slot = self.file.write();

        self.init_locked(&mut slot)?;

        let file = slot.as_ref().ok_or(PageStoreError::Stopped)?;

        file.sync_data().map_err(|e| PageStoreError::io("sync", e))
    }

    /// Allocate the next page and return its index.
    ///
    /// The file is not extended here; it grows on first write.
    pub fn allocate_page(&self) -> Result<u64> {
        self.init()?;

        Ok(self.alloc_page() / self.page_size as u64)
    }

    /// Number of pages the store accounts for, super page included.
    pub fn pages(&self) -> u64 {
        if !self.inited.load(Ordering::Acquire) {
            return 0;
        }

        self.allocated.load(Ordering::Acquire) / self.page_size as u64
    }

    /// Byte offset of the page identified by `page_id`.
    pub fn page_offset(&self, page_id: u64) -> u64 {
        page_id::page_index(page_id) as u64 * self.page_size as u64 + HEADER_SIZE
    }

    fn alloc_page(&self) -> u64 {
        loop {
            let off = self.allocated.load(Ordering::Acquire);

            if self
                .allocated
                .compare_exchange(
                    off,
                    off + self.page_size as u64,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return off;
            }
        }
    }

    /// Double-checked lazy init: open the file, write or verify the
    /// header, and establish the allocation watermark.
    fn init(&self) -> Result<()> {
        if self.inited.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut slot = self.file.write();

        self.init_locked(&mut slot)
    }

    fn init_locked(&self, slot: &mut Option<File>) -> Result<()> {
        if self.inited.load(Ordering::Acquire) {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| PageStoreError::io("open", e))?;

        let len = file
            .metadata()
            .map_err(|e| PageStoreError::io("stat", e))?
            .len();

        let allocated = if len == 0 {
            self.init_file(&file)?
        } else {
            self.check_file(&file, len)?
        };

        debug!(
            path = %self.path.display(),
            allocated,
            page_size = self.page_size,
            "initialized page store file"
        );

        self.allocated.store(allocated, Ordering::Release);

        *slot = Some(file);

        self.inited.store(true, Ordering::Release);

        Ok(())
    }

    /// Write a fresh header. Every store file reserves a super page right
    /// after the header, so the returned watermark covers both.
    fn init_file(&self, file: &File) -> Result<u64> {
        let hdr = FileHeader::new(self.ty, self.page_size).encode();

        file.write_all_at(&hdr, 0)
            .map_err(|e| PageStoreError::io("write", e))?;

        Ok(HEADER_SIZE + self.page_size as u64)
    }

    /// Verify an existing file against the configured type and page size
    /// and return the allocation watermark implied by its length.
    fn check_file(&self, file: &File, len: u64) -> Result<u64> {
        let mut buf = [0u8; HEADER_SIZE as usize];

        file.read_exact_at(&mut buf, 0)
            .map_err(|e| PageStoreError::io("read", e))?;

        let hdr = FileHeader::decode(&buf)?;

        if hdr.ty != self.ty {
            return Err(PageStoreError::InvalidType {
                expected: self.ty,
                actual: hdr.ty,
            });
        }

        if hdr.page_size != self.page_size {
            return Err(PageStoreError::InvalidPageSize {
                expected: self.page_size,
                actual: hdr.page_size,
            });
        }

        // A header-only file still owns its reserved super page.
        let len = if len == HEADER_SIZE {
            HEADER_SIZE + self.page_size as u64
        } else {
            len
        };

        if (len - HEADER_SIZE) % self.page_size as u64 != 0 {
            return Err(PageStoreError::InvalidFileSize {
                file_size: len,
                page_size: self.page_size,
            });
        }

        Ok(len)
    }
}

fn skip_crc_from_env() -> bool {
    std::env::var(SKIP_CRC_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

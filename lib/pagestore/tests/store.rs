// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end page store tests against real temp files.

use std::os::unix::fs::FileExt;

use gridflow_pagestore::{page_io, FilePageStore, PageStoreError, HEADER_SIZE};

const PAGE_SIZE: u32 = 4096;

fn temp_store(dir: &tempfile::TempDir, ty: u8) -> FilePageStore {
    FilePageStore::new(dir.path().join("part-0.bin"), ty, PAGE_SIZE)
}

/// A page buffer filled with `fill`, CRC slot zeroed.
fn page_of(fill: u8) -> Vec<u8> {
    let mut buf = vec![fill; PAGE_SIZE as usize];
    page_io::set_crc(&mut buf, 0);
    buf
}

#[test]
fn fresh_file_reserves_super_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);

    assert!(!store.exists());

    store.ensure().unwrap();

    // Header plus the reserved super page.
    assert_eq!(store.pages(), 1);
    assert_eq!(store.allocate_page().unwrap(), 1);
    assert_eq!(store.pages(), 2);
}

#[test]
fn header_only_file_counts_super_page_on_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = temp_store(&dir, 1);
        store.ensure().unwrap();
        store.stop(false).unwrap();
    }

    // On disk there are only 17 header bytes, no page payload yet.
    let len = std::fs::metadata(dir.path().join("part-0.bin")).unwrap().len();
    assert_eq!(len, HEADER_SIZE);

    let store = temp_store(&dir, 1);
    store.ensure().unwrap();

    assert_eq!(store.pages(), 1);
}

#[test]
fn page_round_trip_with_and_without_kept_crc() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);

    let idx = store.allocate_page().unwrap();
    assert_eq!(idx, 1);

    let mut buf = page_of(0xAB);
    store.write(idx, &mut buf, 0).unwrap();

    // The caller's buffer comes back with a clean CRC slot.
    assert_eq!(page_io::get_crc(&buf), 0);

    let mut out = vec![0u8; PAGE_SIZE as usize];
    store.read(idx, &mut out, false).unwrap();

    assert_eq!(out, page_of(0xAB));
    assert_eq!(page_io::get_crc(&out), 0);

    let mut kept = vec![0u8; PAGE_SIZE as usize];
    store.read(idx, &mut kept, true).unwrap();

    let saved_crc = page_io::get_crc(&kept);
    assert_ne!(saved_crc, 0);

    // Outside the CRC slot the contents match.
    page_io::set_crc(&mut kept, 0);
    assert_eq!(kept, out);
}

#[test]
fn unwritten_page_reads_back_zeroed() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);

    let idx = store.allocate_page().unwrap();

    let mut out = vec![0xFFu8; PAGE_SIZE as usize];
    store.read(idx, &mut out, false).unwrap();

    assert!(out.iter().all(|b| *b == 0));
}

#[test]
fn corrupted_page_fails_crc_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("part-0.bin");
    let store = FilePageStore::new(&path, 1, PAGE_SIZE);

    let idx = store.allocate_page().unwrap();
    let mut buf = page_of(0x5A);
    store.write(idx, &mut buf, 0).unwrap();
    store.sync().unwrap();

    // Flip one byte of the page payload behind the store's back.
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all_at(&[0xA5], store.page_offset(idx) + 100).unwrap();

    let mut out = vec![0u8; PAGE_SIZE as usize];
    let err = store.read(idx, &mut out, false).unwrap_err();

    assert!(matches!(err, PageStoreError::CrcMismatch { page_id, .. } if page_id == idx));
    assert!(err.is_integrity());
}

#[test]
fn concurrent_allocation_yields_distinct_pages() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);
    store.ensure().unwrap();

    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let mut indices = Vec::new();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..PER_THREAD)
                        .map(|_| store.allocate_page().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for h in handles {
            indices.extend(h.join().unwrap());
        }
    });

    indices.sort_unstable();
    indices.dedup();

    assert_eq!(indices.len(), THREADS * PER_THREAD);
    assert_eq!(store.pages() as usize, THREADS * PER_THREAD + 1);
}

#[test]
fn truncate_discards_stale_writers() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);

    let idx = store.allocate_page().unwrap();
    let mut buf = page_of(0x11);
    store.write(idx, &mut buf, 0).unwrap();

    store.truncate(7).unwrap();
    assert_eq!(store.pages(), 1);

    let idx = store.allocate_page().unwrap();
    assert_eq!(idx, 1);

    // A writer from before the truncate is silently dropped.
    let mut stale = page_of(0x22);
    store.write(idx, &mut stale, 6).unwrap();

    let mut out = vec![0xFFu8; PAGE_SIZE as usize];
    store.read(idx, &mut out, false).unwrap();
    assert!(out.iter().all(|b| *b == 0));

    // A current writer goes through.
    let mut fresh = page_of(0x33);
    store.write(idx, &mut fresh, 7).unwrap();

    store.read(idx, &mut out, false).unwrap();
    assert_eq!(out, page_of(0x33));
}

#[test]
fn reopen_with_wrong_type_or_page_size_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("part-0.bin");

    {
        let store = FilePageStore::new(&path, 1, PAGE_SIZE);
        let idx = store.allocate_page().unwrap();
        let mut buf = page_of(0xCD);
        store.write(idx, &mut buf, 0).unwrap();
        store.stop(false).unwrap();
    }

    let len_before = std::fs::metadata(&path).unwrap().len();

    let wrong_type = FilePageStore::new(&path, 2, PAGE_SIZE);
    assert!(matches!(
        wrong_type.ensure().unwrap_err(),
        PageStoreError::InvalidType { expected: 2, actual: 1 }
    ));

    let wrong_page_size = FilePageStore::new(&path, 1, 8192);
    assert!(matches!(
        wrong_page_size.ensure().unwrap_err(),
        PageStoreError::InvalidPageSize { expected: 8192, actual: PAGE_SIZE }
    ));

    // Failed verification must not touch the file.
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);

    let correct = FilePageStore::new(&path, 1, PAGE_SIZE);
    correct.ensure().unwrap();
    assert_eq!(store_contents(&correct, 1), page_of(0xCD));
}

fn store_contents(store: &FilePageStore, idx: u64) -> Vec<u8> {
    let mut out = vec![0u8; PAGE_SIZE as usize];
    store.read(idx, &mut out, false).unwrap();
    out
}

#[test]
fn recover_mode_lifts_the_watermark_check() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);
    store.ensure().unwrap();

    store.begin_recover();

    // Page index 3 was never allocated in this incarnation.
    let mut buf = page_of(0x77);
    store.write(3, &mut buf, 0).unwrap();

    store.finish_recover().unwrap();

    // The watermark now reflects the replayed file size.
    assert_eq!(store.pages(), 4);
    assert_eq!(store_contents(&store, 3), page_of(0x77));
}

#[test]
fn stop_clean_removes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("part-0.bin");
    let store = FilePageStore::new(&path, 1, PAGE_SIZE);

    store.ensure().unwrap();
    assert!(path.exists());

    store.stop(true).unwrap();
    assert!(!path.exists());

    // Stopping an uninitialized store is a no-op.
    store.stop(true).unwrap();
}

#[test]
fn read_header_returns_the_raw_header() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 9);
    store.ensure().unwrap();

    let mut hdr = vec![0u8; HEADER_SIZE as usize];
    store.read_header(&mut hdr).unwrap();

    let decoded =
        gridflow_pagestore::FileHeader::decode(hdr.as_slice().try_into().unwrap()).unwrap();

    assert_eq!(decoded.ty, 9);
    assert_eq!(decoded.page_size, PAGE_SIZE);
}

#[test]
fn exists_requires_more_than_a_header() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir, 1);

    assert!(!store.exists());

    store.ensure().unwrap();

    // Header only: not yet "exists" in the page-bearing sense.
    assert!(!store.exists());

    let idx = store.allocate_page().unwrap();
    let mut buf = page_of(0x01);
    store.write(idx, &mut buf, 0).unwrap();

    assert!(store.exists());
}

// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! CRC slot accessors.
//!
//! The page layout above the header belongs to a collaborator; the store
//! reads and writes exactly one field of it, the 4-byte little-endian CRC
//! slot. Callers must keep the slot zeroed outside the write path.

/// Byte offset of the CRC slot within a page.
pub const CRC_OFF: usize = 4;

/// Read the CRC slot of a page buffer.
pub fn get_crc(buf: &[u8]) -> u32 {
    u32::from_le_bytes(buf[CRC_OFF..CRC_OFF + 4].try_into().unwrap())
}

/// Write the CRC slot of a page buffer.
pub fn set_crc(buf: &mut [u8], crc: u32) {
    buf[CRC_OFF..CRC_OFF + 4].copy_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trip() {
        let mut buf = vec![0u8; 64];

        set_crc(&mut buf, 0xA1B2_C3D4);
        assert_eq!(get_crc(&buf), 0xA1B2_C3D4);

        set_crc(&mut buf, 0);
        assert_eq!(get_crc(&buf), 0);
        assert!(buf.iter().all(|b| *b == 0));
    }
}

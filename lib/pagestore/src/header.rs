// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The 17-byte typed file header.
//!
//! Layout, little-endian: signature `u64`, version `u32`, type `u8`,
//! page size `u32`.

use crate::error::{PageStoreError, Result};
use crate::{HEADER_SIZE, SIGNATURE, VERSION};

/// Decoded store file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Store type discriminator, chosen by the embedding layer.
    pub ty: u8,
    /// Page size in bytes.
    pub page_size: u32,
}

impl FileHeader {
    pub fn new(ty: u8, page_size: u32) -> Self {
        Self { ty, page_size }
    }

    /// Encode the header into its on-disk form.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];

        buf[0..8].copy_from_slice(&SIGNATURE.to_le_bytes());
        buf[8..12].copy_from_slice(&VERSION.to_le_bytes());
        buf[12] = self.ty;
        buf[13..17].copy_from_slice(&self.page_size.to_le_bytes());

        buf
    }

    /// Decode and verify a header read from offset 0 of a store file.
    ///
    /// Signature and version are checked here; type and page size are
    /// returned for the store to compare against its configuration.
    pub fn decode(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        let signature = u64::from_le_bytes(buf[0..8].try_into().unwrap());

        if signature != SIGNATURE {
            return Err(PageStoreError::InvalidSignature {
                expected: SIGNATURE,
                actual: signature,
            });
        }

        let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());

        if version != VERSION {
            return Err(PageStoreError::InvalidVersion {
                expected: VERSION,
                actual: version,
            });
        }

        let ty = buf[12];
        let page_size = u32::from_le_bytes(buf[13..17].try_into().unwrap());

        Ok(Self { ty, page_size })
    }
}

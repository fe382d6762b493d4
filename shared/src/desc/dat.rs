use arrayvec::ArrayVec;

use crate::constants::DAT_EMD_CAPACITY;
use crate::result::{IocError, IocResult};

/// Describes one chunk of stream data with two carriers: a heap ("ptr")
/// buffer for bulk payloads and an embedded ("emd") buffer for small ones.
/// The effective payload is the ptr bytes followed by the emd bytes; a
/// descriptor with both carriers empty carries zero data.
///
/// On the receive path the ptr carrier's window is the receive capacity: the
/// runtime fills it up to `window` bytes and the filled length is the number
/// of bytes actually copied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatDesc {
    ptr: Vec<u8>,
    emd: ArrayVec<u8, DAT_EMD_CAPACITY>,
    window: usize,
}

impl DatDesc {
    /// Build a send descriptor around a heap payload
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Build a send descriptor taking ownership of a heap payload
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let window = bytes.len();
        Self {
            ptr: bytes,
            emd: ArrayVec::new(),
            window,
        }
    }

    /// Build a send descriptor around the embedded carrier. Fails when the
    /// payload does not fit into `DAT_EMD_CAPACITY` bytes.
    pub fn embedded(bytes: &[u8]) -> IocResult<Self> {
        let mut emd = ArrayVec::new();
        emd.try_extend_from_slice(bytes)
            .map_err(|_| IocError::InvalidParam {
                reason: "payload exceeds the embedded carrier capacity",
            })?;
        Ok(Self {
            ptr: Vec::new(),
            emd,
            window: 0,
        })
    }

    /// Build a receive descriptor with the given window (receive capacity)
    pub fn with_capacity(window: usize) -> Self {
        Self {
            ptr: Vec::with_capacity(window),
            emd: ArrayVec::new(),
            window,
        }
    }

    /// Sum of both carriers' lengths
    pub fn effective_size(&self) -> usize {
        self.ptr.len() + self.emd.len()
    }

    /// The receive window: how many bytes a recv may copy in
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn ptr_bytes(&self) -> &[u8] {
        &self.ptr
    }

    pub fn emd_bytes(&self) -> &[u8] {
        &self.emd
    }

    /// The effective payload as one owned buffer (ptr bytes then emd bytes)
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.effective_size());
        payload.extend_from_slice(&self.ptr);
        payload.extend_from_slice(&self.emd);
        payload
    }

    /// Copy received bytes into the ptr carrier, bounded by the remaining
    /// window. Returns how many bytes were taken.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let room = self.window.saturating_sub(self.ptr.len());
        let take = room.min(bytes.len());
        self.ptr.extend_from_slice(&bytes[..take]);
        take
    }
}

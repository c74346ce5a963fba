//! Chunked transfer protocol: split oversized payloads into bounded blocks,
//! reassemble out-of-order arrivals, serve resend requests, bound retention.

use std::collections::HashMap;

use crate::protocol::DataBlock;

/// Default maximum block payload size in bytes.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 50_000;

/// Tuning knobs for both transfer directions. Tick units are host ticks.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Largest block payload in bytes.
    pub max_block_size: usize,
    /// Ticks between consecutive block transmissions (throughput pacing).
    pub send_interval_ticks: u64,
    /// Idle ticks after which a partial transfer triggers resend requests.
    pub resend_poll_ticks: u64,
    /// Ticks after which unacknowledged sent blocks and stale partial
    /// buffers are dropped. Bounds memory under packet loss.
    pub retention_ticks: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            send_interval_ticks: 1,
            resend_poll_ticks: 120,
            retention_ticks: 3000,
        }
    }
}

/// Split a payload into block payloads of at most `max_block_size` bytes.
/// An empty payload still yields one (empty) block so the transfer completes.
pub fn split_payload(payload: &[u8], max_block_size: usize) -> Vec<Vec<u8>> {
    let size = if max_block_size == 0 {
        DEFAULT_MAX_BLOCK_SIZE
    } else {
        max_block_size
    };
    if payload.is_empty() {
        return vec![Vec::new()];
    }
    payload.chunks(size).map(|c| c.to_vec()).collect()
}

struct SentTransfer {
    blocks: Vec<DataBlock>,
    enqueued_tick: u64,
}

/// Sender side: assigns transfer ids, retains sent blocks for resend until
/// acknowledged or expired.
pub struct TransferSender {
    next_transfer_id: u32,
    sent: HashMap<u32, SentTransfer>,
}

impl TransferSender {
    pub fn new() -> Self {
        Self {
            next_transfer_id: 0,
            sent: HashMap::new(),
        }
    }

    /// Queue a payload: fresh transfer id, split into blocks, retain for
    /// resend. Returns the id; fetch the block list via [`blocks`](Self::blocks).
    pub fn enqueue(&mut self, payload: &[u8], max_block_size: usize, now_tick: u64) -> u32 {
        let transfer_id = self.next_transfer_id;
        self.next_transfer_id = self.next_transfer_id.wrapping_add(1);
        let payloads = split_payload(payload, max_block_size);
        let total_blocks = payloads.len() as u32;
        let blocks = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| DataBlock {
                transfer_id,
                block_index: i as u32,
                total_blocks,
                payload,
            })
            .collect();
        self.sent.insert(
            transfer_id,
            SentTransfer {
                blocks,
                enqueued_tick: now_tick,
            },
        );
        transfer_id
    }

    /// Blocks of an outstanding transfer, in index order.
    pub fn blocks(&self, transfer_id: u32) -> Option<&[DataBlock]> {
        self.sent.get(&transfer_id).map(|t| t.blocks.as_slice())
    }

    /// Serve a peer's resend request from the retained cache.
    pub fn block_for_resend(&self, transfer_id: u32, block_index: u32) -> Option<DataBlock> {
        self.sent
            .get(&transfer_id)?
            .blocks
            .get(block_index as usize)
            .cloned()
    }

    /// Peer confirmed full reassembly; retained blocks can go.
    pub fn acknowledge(&mut self, transfer_id: u32) {
        self.sent.remove(&transfer_id);
    }

    /// Drop transfers unacknowledged for longer than `retention_ticks`.
    /// Returns the expired ids.
    pub fn expire(&mut self, now_tick: u64, retention_ticks: u64) -> Vec<u32> {
        let expired: Vec<u32> = self
            .sent
            .iter()
            .filter(|(_, t)| now_tick.saturating_sub(t.enqueued_tick) > retention_ticks)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.sent.remove(id);
        }
        expired
    }

    pub fn outstanding(&self) -> usize {
        self.sent.len()
    }
}

impl Default for TransferSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of feeding one received block to the receiver.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockReceiveResult {
    /// All blocks seen; payload reassembled in index order.
    Complete(Vec<u8>),
    /// Stored; more blocks outstanding.
    InProgress,
    /// Malformed block (bad index or conflicting block count); dropped.
    Rejected,
}

struct PartialTransfer {
    /// Slot per block index, sized from the first block's `total_blocks`.
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
    last_tick: u64,
}

/// Receiver side: per-transfer reassembly buffers keyed by transfer id.
pub struct TransferReceiver {
    partial: HashMap<u32, PartialTransfer>,
}

impl TransferReceiver {
    pub fn new() -> Self {
        Self {
            partial: HashMap::new(),
        }
    }

    /// Place a block by its index (arrival order is irrelevant; duplicates
    /// are idempotent). Completes exactly when the last distinct block of a
    /// transfer arrives; the buffer is consumed on completion.
    pub fn on_block(&mut self, block: DataBlock, now_tick: u64) -> BlockReceiveResult {
        if block.total_blocks == 0 || block.block_index >= block.total_blocks {
            return BlockReceiveResult::Rejected;
        }
        let entry = self
            .partial
            .entry(block.transfer_id)
            .or_insert_with(|| PartialTransfer {
                slots: vec![None; block.total_blocks as usize],
                received: 0,
                last_tick: now_tick,
            });
        if entry.slots.len() != block.total_blocks as usize {
            // Conflicting block count for the same transfer id.
            return BlockReceiveResult::Rejected;
        }
        entry.last_tick = now_tick;
        let slot = &mut entry.slots[block.block_index as usize];
        if slot.is_none() {
            *slot = Some(block.payload);
            entry.received += 1;
        }
        if entry.received < entry.slots.len() {
            return BlockReceiveResult::InProgress;
        }
        match self.partial.remove(&block.transfer_id) {
            Some(entry) => {
                let mut out = Vec::new();
                for slot in entry.slots.into_iter().flatten() {
                    out.extend_from_slice(&slot);
                }
                BlockReceiveResult::Complete(out)
            }
            None => BlockReceiveResult::InProgress,
        }
    }

    /// Indices not yet received for a partial transfer.
    pub fn missing_blocks(&self, transfer_id: u32) -> Vec<u32> {
        match self.partial.get(&transfer_id) {
            Some(entry) => entry
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_none())
                .map(|(i, _)| i as u32)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Transfers idle for longer than `poll_ticks` (candidates for resend
    /// requests).
    pub fn stalled(&self, now_tick: u64, poll_ticks: u64) -> Vec<u32> {
        self.partial
            .iter()
            .filter(|(_, t)| now_tick.saturating_sub(t.last_tick) > poll_ticks)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Drop partial buffers idle for longer than `retention_ticks`. Returns
    /// the abandoned ids.
    pub fn expire(&mut self, now_tick: u64, retention_ticks: u64) -> Vec<u32> {
        let expired: Vec<u32> = self
            .partial
            .iter()
            .filter(|(_, t)| now_tick.saturating_sub(t.last_tick) > retention_ticks)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.partial.remove(id);
        }
        expired
    }

    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

impl Default for TransferReceiver {
    fn default() -> Self {
        Self::new()
    }
}

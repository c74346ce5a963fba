//! SiteLink wire protocol: command kinds, command messages, data blocks.

use serde::{Deserialize, Serialize};

/// Current protocol version. Carried by hosts during session negotiation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Sigil that starts (and separates) encoded commands in a transport text
/// message. Payloads must never contain it; the grammar has no escaping.
pub const COMMAND_SIGIL: char = '@';

/// All command kinds carried as text on the wire. The stringified name is the
/// wire prefix (`@AnchorMoved=...`), so variant names are a wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// A new anchor was created: `id;x/y/z;x/y/z/w`.
    AnchorAdded,
    /// An anchor was removed: `id`.
    AnchorDeleted,
    /// An anchor's pose changed: `id;x/y/z;x/y/z/w`.
    AnchorMoved,
    /// An anchor was renamed: `id;name`.
    AnchorRenamed,
    /// Selection changed: `id`, or `-1` to clear.
    AnchorSelected,
    /// The shared origin moved: `x/y/z;x/y/z/w`.
    NullPointChanged,
    /// Peer entered or left AR mode: `1` / `0`.
    ArModeChanged,
    /// Generic status flag toggle: `flag;1|0`.
    StatusPropertyChanged,
    /// Acknowledge a fully reassembled transfer: `transferId`.
    DataReceived,
    /// Ask the sender to retransmit one block of a transfer; the block index
    /// rides in the message's block field, the payload is the transfer id.
    ResendBlock,
}

impl CommandKind {
    /// Every kind, in the order the dispatcher tries prefixes.
    pub const ALL: [CommandKind; 10] = [
        CommandKind::AnchorAdded,
        CommandKind::AnchorDeleted,
        CommandKind::AnchorMoved,
        CommandKind::AnchorRenamed,
        CommandKind::AnchorSelected,
        CommandKind::NullPointChanged,
        CommandKind::ArModeChanged,
        CommandKind::StatusPropertyChanged,
        CommandKind::DataReceived,
        CommandKind::ResendBlock,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::AnchorAdded => "AnchorAdded",
            CommandKind::AnchorDeleted => "AnchorDeleted",
            CommandKind::AnchorMoved => "AnchorMoved",
            CommandKind::AnchorRenamed => "AnchorRenamed",
            CommandKind::AnchorSelected => "AnchorSelected",
            CommandKind::NullPointChanged => "NullPointChanged",
            CommandKind::ArModeChanged => "ArModeChanged",
            CommandKind::StatusPropertyChanged => "StatusPropertyChanged",
            CommandKind::DataReceived => "DataReceived",
            CommandKind::ResendBlock => "ResendBlock",
        }
    }
}

/// One typed command. Immutable once built; transmitted and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub kind: CommandKind,
    pub message: String,
    /// Block index for chunk-level commands; `None` = not applicable.
    pub block: Option<u32>,
}

impl CommandMessage {
    pub fn new(kind: CommandKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            block: None,
        }
    }

    pub fn with_block(kind: CommandKind, message: impl Into<String>, block: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            block: Some(block),
        }
    }
}

/// One fragment of a chunked transfer. Encoding is bincode; the serialized
/// envelope is sent as a single binary transport message (see frame module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    pub transfer_id: u32,
    pub block_index: u32,
    pub total_blocks: u32,
    pub payload: Vec<u8>,
}

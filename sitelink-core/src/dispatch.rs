//! Command dispatcher: the host-driven communication manager. The host feeds
//! received transport messages (text and binary) plus ticks; the manager
//! returns outbound actions to hand to the transport. In loopback mode the
//! manager feeds its own receive path instead, for deterministic testing
//! without a live transport.

use std::collections::VecDeque;

use crate::codec::{self, CodecError};
use crate::frame;
use crate::math::Pose;
use crate::protocol::{CommandKind, CommandMessage, DataBlock};
use crate::transfer::{
    BlockReceiveResult, TransferConfig, TransferReceiver, TransferSender,
};

/// Handler methods, one per command kind, plus chat and reassembled payloads.
/// Defaults are no-ops so implementations override only what they consume.
/// Handlers must tolerate duplicate delivery; the transport does not
/// guarantee exactly-once for chunked payloads prior to acknowledgment.
pub trait CommandHandler {
    fn on_chat(&mut self, text: &str) {
        let _ = text;
    }
    fn on_anchor_added(&mut self, id: u32, pose: Pose) {
        let _ = (id, pose);
    }
    fn on_anchor_deleted(&mut self, id: u32) {
        let _ = id;
    }
    fn on_anchor_moved(&mut self, id: u32, pose: Pose) {
        let _ = (id, pose);
    }
    fn on_anchor_renamed(&mut self, id: u32, name: &str) {
        let _ = (id, name);
    }
    fn on_anchor_selected(&mut self, id: Option<u32>) {
        let _ = id;
    }
    fn on_null_point_changed(&mut self, pose: Pose) {
        let _ = pose;
    }
    fn on_ar_mode_changed(&mut self, active: bool) {
        let _ = active;
    }
    fn on_status_property_changed(&mut self, flag: &str, value: bool) {
        let _ = (flag, value);
    }
    fn on_payload(&mut self, transfer_id: u32, payload: Vec<u8>) {
        let _ = (transfer_id, payload);
    }
}

/// Action for the host to perform against the transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send as one text message.
    Text(String),
    /// Send as one binary message.
    Frame(Vec<u8>),
}

/// Manager tuning. `max_message_size` is the transport's hard per-message
/// limit; block payloads are clamped so the envelope always fits it.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub transfer: TransferConfig,
    pub max_message_size: usize,
    /// Route own sends back into the own receive path (no transport).
    pub loopback: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            max_message_size: 65_536,
            loopback: false,
        }
    }
}

/// Encodes/decodes commands, routes them to the handler, and runs both sides
/// of the chunked transfer protocol.
pub struct CommunicationManager<H: CommandHandler> {
    pub handler: H,
    config: ManagerConfig,
    sender: TransferSender,
    receiver: TransferReceiver,
    /// Blocks awaiting paced transmission, front first.
    send_queue: VecDeque<DataBlock>,
    outbox: Vec<Outbound>,
    tick_count: u64,
    last_block_tick: u64,
    last_resend_poll: u64,
}

impl<H: CommandHandler> CommunicationManager<H> {
    pub fn new(handler: H, config: ManagerConfig) -> Self {
        Self {
            handler,
            config,
            sender: TransferSender::new(),
            receiver: TransferReceiver::new(),
            send_queue: VecDeque::new(),
            outbox: Vec::new(),
            tick_count: 0,
            last_block_tick: 0,
            last_resend_poll: 0,
        }
    }

    /// Largest block payload compatible with both the configured block size
    /// and the transport message limit.
    fn effective_block_size(&self) -> usize {
        self.config
            .transfer
            .max_block_size
            .min(frame::max_payload_for(self.config.max_message_size))
            .max(1)
    }

    /// Encode and emit one command (or feed it back in loopback mode).
    pub fn send(&mut self, cmd: &CommandMessage) {
        let wire = codec::encode(cmd);
        if self.config.loopback {
            self.receive_text(&wire);
        } else {
            self.outbox.push(Outbound::Text(wire));
        }
    }

    /// Emit plain chat text. The wire grammar cannot escape the command
    /// sigil, so it is stripped here rather than corrupting the stream.
    pub fn send_chat(&mut self, text: &str) {
        let clean: String = text.chars().filter(|&c| c != '@').collect();
        if self.config.loopback {
            self.receive_text(&clean);
        } else {
            self.outbox.push(Outbound::Text(clean));
        }
    }

    /// Queue an arbitrarily large payload as a chunked transfer. Blocks go
    /// out paced, one per send interval, via [`tick`](Self::tick). Returns
    /// the transfer id.
    pub fn send_payload(&mut self, payload: &[u8]) -> u32 {
        let block_size = self.effective_block_size();
        let id = self.sender.enqueue(payload, block_size, self.tick_count);
        if let Some(blocks) = self.sender.blocks(id) {
            self.send_queue.extend(blocks.iter().cloned());
        }
        id
    }

    /// Process one received transport text message. Text without the command
    /// sigil is chat; otherwise each `@`-separated fragment is decoded and
    /// dispatched. Unknown kinds are ignored; a malformed fragment aborts
    /// only its own effect.
    pub fn receive_text(&mut self, wire: &str) {
        if !codec::is_command_text(wire) {
            self.handler.on_chat(wire);
            return;
        }
        let fragments: Vec<String> = codec::split_commands(wire)
            .into_iter()
            .map(str::to_string)
            .collect();
        for fragment in fragments {
            self.dispatch_fragment(&fragment);
        }
    }

    fn dispatch_fragment(&mut self, fragment: &str) {
        for kind in CommandKind::ALL {
            if let Some(param) = codec::decode(fragment, kind) {
                let param = param.to_string();
                if let Err(e) = self.apply(kind, &param) {
                    log::warn!("dropping malformed {} command: {}", kind.as_str(), e);
                }
                return;
            }
        }
        log::debug!("ignoring unknown command fragment: {:?}", fragment);
    }

    fn apply(&mut self, kind: CommandKind, param: &str) -> Result<(), CodecError> {
        match kind {
            CommandKind::AnchorAdded => {
                let (id, pose) = parse_id_pose(param)?;
                self.handler.on_anchor_added(id, pose);
            }
            CommandKind::AnchorDeleted => {
                let id = parse_id(param)?;
                self.handler.on_anchor_deleted(id);
            }
            CommandKind::AnchorMoved => {
                let (id, pose) = parse_id_pose(param)?;
                self.handler.on_anchor_moved(id, pose);
            }
            CommandKind::AnchorRenamed => {
                let (id_field, name) = split_once(param)?;
                let id = parse_id(id_field)?;
                self.handler.on_anchor_renamed(id, name);
            }
            CommandKind::AnchorSelected => {
                let raw = codec::parse_i64(param)?;
                let id = if raw < 0 { None } else { Some(raw as u32) };
                self.handler.on_anchor_selected(id);
            }
            CommandKind::NullPointChanged => {
                let (pos_field, rot_field) = split_once(param)?;
                let pose = Pose::new(
                    codec::parse_vec3(pos_field)?,
                    codec::parse_quat(rot_field)?,
                );
                self.handler.on_null_point_changed(pose);
            }
            CommandKind::ArModeChanged => {
                let active = codec::parse_bool(param)?;
                self.handler.on_ar_mode_changed(active);
            }
            CommandKind::StatusPropertyChanged => {
                let (flag, value_field) = split_once(param)?;
                let value = codec::parse_bool(value_field)?;
                self.handler.on_status_property_changed(flag, value);
            }
            CommandKind::DataReceived => {
                let transfer_id = parse_id(param)?;
                self.sender.acknowledge(transfer_id);
                // blocks of an acknowledged transfer no longer need sending
                self.send_queue.retain(|b| b.transfer_id != transfer_id);
            }
            CommandKind::ResendBlock => {
                let (block_index, rest) = codec::split_block(param)?;
                let transfer_id = parse_id(rest)?;
                match self.sender.block_for_resend(transfer_id, block_index) {
                    Some(block) => self.emit_block(block),
                    None => log::warn!(
                        "resend requested for evicted transfer {} block {}",
                        transfer_id,
                        block_index
                    ),
                }
            }
        }
        Ok(())
    }

    /// Process one received binary transport message (a block envelope). On
    /// completion the `DataReceived` acknowledgment goes back to the sender
    /// and the payload is handed to the handler.
    pub fn receive_frame(&mut self, bytes: &[u8]) {
        let block = match frame::decode_block(bytes) {
            Ok(block) => block,
            Err(e) => {
                log::warn!("dropping undecodable frame: {}", e);
                return;
            }
        };
        let transfer_id = block.transfer_id;
        match self.receiver.on_block(block, self.tick_count) {
            BlockReceiveResult::Complete(payload) => {
                self.send(&CommandMessage::new(
                    CommandKind::DataReceived,
                    transfer_id.to_string(),
                ));
                self.handler.on_payload(transfer_id, payload);
            }
            BlockReceiveResult::InProgress => {}
            BlockReceiveResult::Rejected => {
                log::warn!("rejected malformed block for transfer {}", transfer_id);
            }
        }
    }

    fn emit_block(&mut self, block: DataBlock) {
        match frame::encode_block(&block, self.config.max_message_size) {
            Ok(bytes) => {
                if self.config.loopback {
                    self.receive_frame(&bytes);
                } else {
                    self.outbox.push(Outbound::Frame(bytes));
                }
            }
            Err(e) => log::warn!("dropping unencodable block: {}", e),
        }
    }

    /// Advance one host tick: paced block transmission, periodic resend
    /// polling for stalled partial transfers, retention expiry. Returns the
    /// outbound actions accumulated since the last drain.
    pub fn tick(&mut self) -> Vec<Outbound> {
        self.tick_count = self.tick_count.saturating_add(1);

        if let Some(block) = self.send_queue.front() {
            let due = self.tick_count.saturating_sub(self.last_block_tick)
                >= self.config.transfer.send_interval_ticks;
            if due {
                let block = block.clone();
                self.send_queue.pop_front();
                self.last_block_tick = self.tick_count;
                self.emit_block(block);
            }
        }

        let poll = self.config.transfer.resend_poll_ticks;
        if self
            .tick_count
            .saturating_sub(self.last_resend_poll)
            >= poll
        {
            self.last_resend_poll = self.tick_count;
            for transfer_id in self.receiver.stalled(self.tick_count, poll) {
                for index in self.receiver.missing_blocks(transfer_id) {
                    self.send(&CommandMessage::with_block(
                        CommandKind::ResendBlock,
                        transfer_id.to_string(),
                        index,
                    ));
                }
            }
        }

        let retention = self.config.transfer.retention_ticks;
        for id in self.sender.expire(self.tick_count, retention) {
            log::warn!("sent transfer {} expired unacknowledged", id);
        }
        for id in self.receiver.expire(self.tick_count, retention) {
            log::warn!("partial transfer {} abandoned", id);
        }

        self.drain_outbox()
    }

    /// Take whatever is queued for the transport without advancing time.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_blocks(&self) -> usize {
        self.send_queue.len()
    }

    pub fn outstanding_transfers(&self) -> usize {
        self.sender.outstanding()
    }
}

fn parse_id(field: &str) -> Result<u32, CodecError> {
    let raw = codec::parse_i64(field)?;
    u32::try_from(raw).map_err(|_| CodecError::InvalidNumber(field.to_string()))
}

fn parse_id_pose(param: &str) -> Result<(u32, Pose), CodecError> {
    let mut parts = param.splitn(3, ';');
    let id = parse_id(parts.next().unwrap_or_default())?;
    let position = codec::parse_vec3(parts.next().unwrap_or_default())?;
    let rotation = codec::parse_quat(parts.next().unwrap_or_default())?;
    Ok((id, Pose::new(position, rotation)))
}

fn split_once(param: &str) -> Result<(&str, &str), CodecError> {
    param.split_once(';').ok_or(CodecError::Arity {
        expected: 2,
        got: 1,
    })
}

/// Builders for the outgoing command vocabulary.
pub mod commands {
    use super::*;
    use crate::codec::{encode_bool, encode_quat, encode_vec3};

    pub fn anchor_added(id: u32, pose: Pose) -> CommandMessage {
        CommandMessage::new(
            CommandKind::AnchorAdded,
            format!(
                "{};{};{}",
                id,
                encode_vec3(pose.position),
                encode_quat(pose.rotation)
            ),
        )
    }

    pub fn anchor_deleted(id: u32) -> CommandMessage {
        CommandMessage::new(CommandKind::AnchorDeleted, id.to_string())
    }

    pub fn anchor_moved(id: u32, pose: Pose) -> CommandMessage {
        CommandMessage::new(
            CommandKind::AnchorMoved,
            format!(
                "{};{};{}",
                id,
                encode_vec3(pose.position),
                encode_quat(pose.rotation)
            ),
        )
    }

    pub fn anchor_renamed(id: u32, name: &str) -> CommandMessage {
        CommandMessage::new(CommandKind::AnchorRenamed, format!("{};{}", id, name))
    }

    pub fn anchor_selected(id: Option<u32>) -> CommandMessage {
        let field = match id {
            Some(id) => id.to_string(),
            None => "-1".to_string(),
        };
        CommandMessage::new(CommandKind::AnchorSelected, field)
    }

    pub fn null_point_changed(pose: Pose) -> CommandMessage {
        CommandMessage::new(
            CommandKind::NullPointChanged,
            format!(
                "{};{}",
                encode_vec3(pose.position),
                encode_quat(pose.rotation)
            ),
        )
    }

    pub fn ar_mode_changed(active: bool) -> CommandMessage {
        CommandMessage::new(CommandKind::ArModeChanged, encode_bool(active))
    }

    pub fn status_property_changed(flag: &str, value: bool) -> CommandMessage {
        CommandMessage::new(
            CommandKind::StatusPropertyChanged,
            format!("{};{}", flag, encode_bool(value)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[derive(Default)]
    struct RecordingHandler {
        calls: Vec<String>,
        payloads: Vec<(u32, Vec<u8>)>,
    }

    impl CommandHandler for RecordingHandler {
        fn on_chat(&mut self, text: &str) {
            self.calls.push(format!("chat:{}", text));
        }
        fn on_anchor_added(&mut self, id: u32, pose: Pose) {
            self.calls
                .push(format!("added:{}@{:?}", id, pose.position));
        }
        fn on_anchor_deleted(&mut self, id: u32) {
            self.calls.push(format!("deleted:{}", id));
        }
        fn on_anchor_selected(&mut self, id: Option<u32>) {
            self.calls.push(format!("selected:{:?}", id));
        }
        fn on_ar_mode_changed(&mut self, active: bool) {
            self.calls.push(format!("armode:{}", active));
        }
        fn on_status_property_changed(&mut self, flag: &str, value: bool) {
            self.calls.push(format!("status:{}={}", flag, value));
        }
        fn on_payload(&mut self, transfer_id: u32, payload: Vec<u8>) {
            self.payloads.push((transfer_id, payload));
        }
    }

    fn manager(loopback: bool) -> CommunicationManager<RecordingHandler> {
        CommunicationManager::new(
            RecordingHandler::default(),
            ManagerConfig {
                loopback,
                ..ManagerConfig::default()
            },
        )
    }

    #[test]
    fn plain_text_routes_to_chat() {
        let mut m = manager(false);
        m.receive_text("need a hand with the pump");
        assert_eq!(m.handler.calls, vec!["chat:need a hand with the pump"]);
    }

    #[test]
    fn concatenated_commands_dispatch_in_order() {
        let mut m = manager(false);
        m.receive_text("@AnchorDeleted=4@ArModeChanged=1@AnchorSelected=-1");
        assert_eq!(
            m.handler.calls,
            vec!["deleted:4", "armode:true", "selected:None"]
        );
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let mut m = manager(false);
        m.receive_text("@FroznakRequested=77@AnchorDeleted=1");
        assert_eq!(m.handler.calls, vec!["deleted:1"]);
    }

    #[test]
    fn malformed_fragment_aborts_only_itself() {
        let mut m = manager(false);
        m.receive_text("@AnchorDeleted=notanumber@ArModeChanged=1");
        assert_eq!(m.handler.calls, vec!["armode:true"]);
    }

    #[test]
    fn status_property_roundtrip() {
        let mut m = manager(false);
        m.send(&commands::status_property_changed("Microphone", true));
        let out = m.drain_outbox();
        assert_eq!(
            out,
            vec![Outbound::Text("@StatusPropertyChanged=Microphone;1".into())]
        );
        m.receive_text("@StatusPropertyChanged=Microphone;1");
        assert_eq!(m.handler.calls, vec!["status:Microphone=true"]);
    }

    #[test]
    fn loopback_send_feeds_own_handler() {
        let mut m = manager(true);
        m.send(&commands::anchor_added(
            3,
            Pose::from_position(Vec3::new(1.0, 2.0, 3.0)),
        ));
        assert_eq!(m.handler.calls.len(), 1);
        assert!(m.handler.calls[0].starts_with("added:3@"));
        assert!(m.drain_outbox().is_empty());
    }

    #[test]
    fn chat_sigil_is_stripped_not_escaped() {
        let mut m = manager(true);
        m.send_chat("see the valve @ the top");
        assert_eq!(m.handler.calls, vec!["chat:see the valve  the top"]);
    }

    fn pump(from: &mut CommunicationManager<RecordingHandler>, to: &mut CommunicationManager<RecordingHandler>) {
        for action in from.tick() {
            match action {
                Outbound::Text(text) => to.receive_text(&text),
                Outbound::Frame(bytes) => to.receive_frame(&bytes),
            }
        }
    }

    #[test]
    fn payload_transfer_end_to_end_with_ack() {
        let mut sender = manager(false);
        let mut receiver = manager(false);
        let data: Vec<u8> = (0..120_000).map(|i| (i % 253) as u8).collect();
        let id = sender.send_payload(&data);
        assert_eq!(sender.pending_blocks(), 3);

        for _ in 0..10 {
            pump(&mut sender, &mut receiver);
            pump(&mut receiver, &mut sender);
        }

        assert_eq!(receiver.handler.payloads.len(), 1);
        assert_eq!(receiver.handler.payloads[0], (id, data));
        // ack released the sender's retained blocks
        assert_eq!(sender.outstanding_transfers(), 0);
    }

    #[test]
    fn pacing_emits_one_frame_per_interval() {
        let mut m = manager(false);
        m.send_payload(&vec![7u8; 120_000]);
        let first = m.tick();
        assert_eq!(
            first
                .iter()
                .filter(|a| matches!(a, Outbound::Frame(_)))
                .count(),
            1
        );
    }

    #[test]
    fn lost_block_recovered_via_resend_request() {
        let mut sender = CommunicationManager::new(
            RecordingHandler::default(),
            ManagerConfig {
                transfer: TransferConfig {
                    resend_poll_ticks: 5,
                    ..TransferConfig::default()
                },
                ..ManagerConfig::default()
            },
        );
        let mut receiver = CommunicationManager::new(
            RecordingHandler::default(),
            ManagerConfig {
                transfer: TransferConfig {
                    resend_poll_ticks: 5,
                    ..TransferConfig::default()
                },
                ..ManagerConfig::default()
            },
        );

        let data: Vec<u8> = (0..120_000).map(|i| (i % 241) as u8).collect();
        let id = sender.send_payload(&data);

        // deliver all frames except the second one
        let mut dropped = false;
        for _ in 0..6 {
            for action in sender.tick() {
                if let Outbound::Frame(bytes) = action {
                    let block = frame::decode_block(&bytes).unwrap();
                    if block.block_index == 1 && !dropped {
                        dropped = true;
                        continue;
                    }
                    receiver.receive_frame(&bytes);
                }
            }
        }
        assert!(dropped);
        assert!(receiver.handler.payloads.is_empty());

        // receiver's poll eventually requests the missing block
        let mut recovered = false;
        for _ in 0..20 {
            pump(&mut receiver, &mut sender);
            pump(&mut sender, &mut receiver);
            if !receiver.handler.payloads.is_empty() {
                recovered = true;
                break;
            }
        }
        assert!(recovered);
        assert_eq!(receiver.handler.payloads[0], (id, data));
    }

    #[test]
    fn duplicate_payload_delivery_is_tolerated() {
        let mut m = manager(false);
        let data = vec![3u8; 10];
        let id = m.sender.enqueue(&data, 50, 0);
        let block = m.sender.blocks(id).unwrap()[0].clone();
        let bytes = frame::encode_block(&block, 65_536).unwrap();
        m.receive_frame(&bytes);
        m.receive_frame(&bytes);
        // second delivery re-opens a buffer slot but completes again only on
        // a full set; a single-block transfer completes each time it is fully
        // redelivered, which handlers must tolerate (idempotence contract)
        assert!(!m.handler.payloads.is_empty());
        for (tid, payload) in &m.handler.payloads {
            assert_eq!((*tid, payload.as_slice()), (id, data.as_slice()));
        }
    }
}

//! Annotation-sync session: the concrete command handler that applies remote
//! commands to an anchor point store. Worker and expert devices run the same
//! session; the role only decides which commands a host originates.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::anchor::AnchorPointStore;
use crate::dispatch::{commands, CommandHandler};
use crate::math::Pose;
use crate::protocol::CommandMessage;

/// Named boolean status flags mirrored between peers (microphone muted,
/// flashlight on, and so on).
#[derive(Debug, Default)]
pub struct StatusRegistry {
    flags: HashMap<String, bool>,
}

impl StatusRegistry {
    /// Set a flag; returns whether the value changed.
    pub fn set(&mut self, flag: &str, value: bool) -> bool {
        self.flags.insert(flag.to_string(), value) != Some(value)
    }

    /// Unset flags read as false.
    pub fn get(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }
}

/// Session state mutated by remote commands. All handlers are idempotent:
/// a duplicate delivery converges to the same state.
pub struct AnchorSyncSession {
    pub store: AnchorPointStore,
    pub status: StatusRegistry,
    pub peer_ar_active: bool,
    pub chat_log: Vec<String>,
    /// Reassembled payloads, deduplicated by transfer id.
    pub received_payloads: Vec<(u32, Vec<u8>)>,
    seen_transfers: HashSet<u32>,
}

impl AnchorSyncSession {
    pub fn new(store: AnchorPointStore) -> Self {
        Self {
            store,
            status: StatusRegistry::default(),
            peer_ar_active: false,
            chat_log: Vec::new(),
            received_payloads: Vec::new(),
            seen_transfers: HashSet::new(),
        }
    }

    /// Create an anchor locally and build the command announcing it.
    pub fn local_add(&mut self, pose: Pose) -> (u32, CommandMessage) {
        let id = self.store.add(pose, true);
        (id, commands::anchor_added(id, pose))
    }

    /// Remove an anchor locally and build the matching command.
    pub fn local_remove(&mut self, id: u32) -> CommandMessage {
        self.store.remove(id);
        commands::anchor_deleted(id)
    }

    /// Move an anchor locally and build the matching command.
    pub fn local_move(&mut self, id: u32, pose: Pose) -> Option<CommandMessage> {
        if self.store.move_anchor(id, pose) {
            Some(commands::anchor_moved(id, pose))
        } else {
            None
        }
    }

    /// Change the selection locally and build the matching command.
    pub fn local_select(&mut self, id: Option<u32>) -> CommandMessage {
        match id {
            Some(id) => {
                self.store.select(id);
            }
            None => self.store.clear_selection(),
        }
        commands::anchor_selected(self.store.selected_id())
    }
}

impl CommandHandler for AnchorSyncSession {
    fn on_chat(&mut self, text: &str) {
        self.chat_log.push(text.to_string());
    }

    fn on_anchor_added(&mut self, id: u32, pose: Pose) {
        if self.store.get(id).is_some() {
            // duplicate delivery: converge on the announced pose
            self.store.move_anchor(id, pose);
        } else {
            self.store.insert_loaded(id, String::new(), crate::anchor::AnchorType::Standard, pose);
        }
    }

    fn on_anchor_deleted(&mut self, id: u32) {
        self.store.remove(id);
    }

    fn on_anchor_moved(&mut self, id: u32, pose: Pose) {
        self.store.move_anchor(id, pose);
    }

    fn on_anchor_renamed(&mut self, id: u32, name: &str) {
        self.store.rename(id, name);
    }

    fn on_anchor_selected(&mut self, id: Option<u32>) {
        match id {
            Some(id) => {
                self.store.select(id);
            }
            None => self.store.clear_selection(),
        }
    }

    fn on_null_point_changed(&mut self, pose: Pose) {
        // peer moved the shared origin; locals stay fixed and ride along
        self.store.set_null_point(pose, false);
    }

    fn on_ar_mode_changed(&mut self, active: bool) {
        self.peer_ar_active = active;
    }

    fn on_status_property_changed(&mut self, flag: &str, value: bool) {
        self.status.set(flag, value);
    }

    fn on_payload(&mut self, transfer_id: u32, payload: Vec<u8>) {
        if self.seen_transfers.insert(transfer_id) {
            self.received_payloads.push((transfer_id, payload));
        }
    }
}

//! SiteLink annotation-sync reference implementation.
//! Host-driven: no I/O; the host feeds transport messages and ticks, and
//! receives outbound actions plus store mutations.

pub mod anchor;
pub mod codec;
pub mod dispatch;
pub mod frame;
pub mod math;
pub mod persist;
pub mod ports;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod transfer;

pub use anchor::{AlignTarget, AnchorObserver, AnchorPoint, AnchorPointStore, AnchorType};
pub use dispatch::{commands, CommandHandler, CommunicationManager, ManagerConfig, Outbound};
pub use math::Pose;
pub use ports::{AnchorCreator, ArPorts, CameraRig, PlaneFinder, PoseDriver, PoseRaycaster};
pub use protocol::{CommandKind, CommandMessage, DataBlock, PROTOCOL_VERSION};
pub use session::AnchorSyncSession;
pub use transfer::{TransferConfig, TransferReceiver, TransferSender};

// SiteLink host: runs a scripted worker/expert session over an in-memory
// channel. Stands in for the WebRTC transport the mobile apps use.

mod config;

use anyhow::Context;
use glam::{Quat, Vec3};
use sitelink_core::{
    commands, AnchorPointStore, AnchorSyncSession, CommunicationManager, ManagerConfig, Outbound,
    Pose, TransferConfig,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type Manager = CommunicationManager<AnchorSyncSession>;

fn manager_config(cfg: &config::Config) -> ManagerConfig {
    ManagerConfig {
        transfer: TransferConfig {
            max_block_size: cfg.max_block_size,
            send_interval_ticks: cfg.send_interval_ticks,
            resend_poll_ticks: cfg.resend_poll_ticks,
            retention_ticks: cfg.retention_ticks,
        },
        max_message_size: cfg.max_message_size,
        loopback: false,
    }
}

/// Deliver everything `from` has queued to `to`, advancing one tick.
fn pump(from: &mut Manager, to: &mut Manager) {
    for action in from.tick() {
        match action {
            Outbound::Text(text) => to.receive_text(&text),
            Outbound::Frame(bytes) => to.receive_frame(&bytes),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("sitelink-host {}", VERSION);
            return Ok(());
        }
    }

    let cfg = config::load();
    log::info!("config: {:?}", cfg);

    let mut worker = Manager::new(
        AnchorSyncSession::new(AnchorPointStore::default()),
        manager_config(&cfg),
    );
    let mut expert = Manager::new(
        AnchorSyncSession::new(AnchorPointStore::default()),
        manager_config(&cfg),
    );

    // worker places two anchors and announces them
    let (valve_id, cmd) = worker.handler.local_add(Pose::new(
        Vec3::new(1.2, 0.0, 0.4),
        Quat::from_rotation_y(0.3),
    ));
    worker.send(&cmd);
    let (gauge_id, cmd) = worker
        .handler
        .local_add(Pose::from_position(Vec3::new(-0.5, 1.1, 2.0)));
    worker.send(&cmd);
    worker.send(&commands::anchor_renamed(valve_id, "inlet valve"));
    worker.send(&commands::ar_mode_changed(true));
    pump(&mut worker, &mut expert);

    // expert annotates: selects the valve and sends back a marked-up snapshot
    expert.send(&commands::anchor_selected(Some(valve_id)));
    let snapshot: Vec<u8> = (0..220_000u32).map(|i| (i % 251) as u8).collect();
    let transfer_id = expert.send_payload(&snapshot);
    log::info!(
        "expert queued snapshot transfer {} ({} bytes)",
        transfer_id,
        snapshot.len()
    );

    for _ in 0..64 {
        pump(&mut expert, &mut worker);
        pump(&mut worker, &mut expert);
        if !worker.handler.received_payloads.is_empty() {
            break;
        }
    }

    let received = worker
        .handler
        .received_payloads
        .first()
        .context("snapshot transfer did not complete")?;
    anyhow::ensure!(received.1 == snapshot, "snapshot payload corrupted in transit");

    // worker persists the session, then reloads as a later tracking session
    // would: the valve anchor is re-observed at a slightly shifted pose
    let path = std::env::temp_dir().join(format!("sitelink-session-{}.json", std::process::id()));
    sitelink_core::persist::save(&worker.handler.store, &path)?;
    let live_valve = Pose::new(Vec3::new(1.25, 0.02, 0.38), Quat::from_rotation_y(0.31));
    let mut restored = AnchorPointStore::default();
    let new_ids = sitelink_core::persist::load(
        &mut restored,
        &path,
        i64::from(valve_id),
        live_valve,
        false,
    )?;
    std::fs::remove_file(&path).ok();

    println!("worker anchors:   {}", worker.handler.store.len());
    println!("expert anchors:   {}", expert.handler.store.len());
    println!(
        "expert selection: {:?}",
        worker.handler.store.selected_id()
    );
    println!("snapshot bytes:   {}", received.1.len());
    println!("reloaded anchors: {:?}", new_ids);
    if let Some(pose) = restored.get(valve_id).map(|a| a.local_pose) {
        println!(
            "valve after reconciliation: ({:.2}, {:.2}, {:.2})",
            pose.position.x, pose.position.y, pose.position.z
        );
    }
    let _ = gauge_id;
    Ok(())
}

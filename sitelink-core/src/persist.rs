//! Anchor document persistence: JSON save/load of the full anchor set plus
//! the null point, with reference-frame reconciliation applied on load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorPointStore, AnchorType};
use crate::math::Pose;
use crate::reconcile;

/// Document shape on disk:
/// `{"NullPoint": {...}, "Points": [{"Id":0,"Name":"","Pose":{...},"Type":"Standard"}, ...]}`
#[derive(Debug, Serialize, Deserialize)]
struct AnchorDocument {
    #[serde(rename = "NullPoint")]
    null_point: Pose,
    #[serde(rename = "Points")]
    points: Vec<PersistedAnchor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedAnchor {
    #[serde(rename = "Id")]
    id: u32,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Pose")]
    pose: Pose,
    #[serde(rename = "Type")]
    kind: AnchorType,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("anchor file not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("document error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize the store's anchors and null point to `path`.
pub fn save(store: &AnchorPointStore, path: &Path) -> Result<(), PersistError> {
    let doc = AnchorDocument {
        null_point: store.null_point(),
        points: store
            .iter()
            .map(|a| PersistedAnchor {
                id: a.id,
                name: a.name.clone(),
                pose: a.local_pose,
                kind: a.kind,
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&doc)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load anchors from `path` into the store.
///
/// With `reference_anchor_id >= 0` every loaded pose is re-expressed via the
/// reconciliation correction derived from that anchor's stored pose and
/// `live_reference_pose`. Non-additive loads clear existing anchors first and
/// restore the document's null point; additive loads keep both, reassigning
/// fresh ids to colliding incoming anchors (the original id is remembered on
/// the new anchor). Returns the ids created by this load; the store is left
/// untouched on any failure.
pub fn load(
    store: &mut AnchorPointStore,
    path: &Path,
    reference_anchor_id: i64,
    live_reference_pose: Pose,
    additive: bool,
) -> Result<Vec<u32>, PersistError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PersistError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(PersistError::Io(e)),
    };
    let doc: AnchorDocument = serde_json::from_str(&json)?;

    let batch: Vec<(u32, Pose)> = doc.points.iter().map(|p| (p.id, p.pose)).collect();
    let correction =
        reconcile::batch_correction(&batch, reference_anchor_id, &live_reference_pose);

    store.notify_loading();
    if !additive {
        store.clear();
        store.set_null_point(doc.null_point, false);
    }

    let mut new_ids = Vec::with_capacity(doc.points.len());
    for point in doc.points {
        let pose = reconcile::apply_correction(&correction, &point.pose);
        new_ids.push(store.insert_loaded(point.id, point.name, point.kind, pose));
    }
    log::debug!("loaded {} anchors from {}", new_ids.len(), path.display());
    store.notify_loaded(&new_ids);
    Ok(new_ids)
}

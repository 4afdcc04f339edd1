//! Sovereign store: directory-per-entity filesystem persistence.
//!
//! One directory per logical path (percent-encoded so nested paths like
//! "notes/x.md" don't collide with the filesystem's own separator), one
//! subdirectory per numbered version holding verbatim bytes plus a
//! metadata record, a "current" pointer, and an overlay. Writes go
//! through a temp path then rename, the same atomic-write discipline
//! used for transaction boundaries elsewhere in this codebase, adapted
//! here to plain files since a relational store has no natural home for
//! "verbatim bytes on disk".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use dashmap::DashMap;
use serde_json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::mark::{Mark, MarkId};

use super::extract::extract_edges;
use super::types::{DiscoveredEdge, IngestEvent, IngestedEntity, Overlay, SovereignEntity, Version};

#[derive(Debug, Error)]
pub enum SovereignError {
    #[error("io error at {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("corruption detected for {0} version {1}")]
    Corruption(String, u32),
}

pub type SovereignResult<T> = Result<T, SovereignError>;

fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn encode_path(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_string() } else { format!("_{:02x}_", c as u32) })
        .collect()
}

/// Persists sovereign entities under `root`, one directory per entity path.
pub struct SovereignStore {
    root: PathBuf,
    /// In-memory cache mirroring what's on disk, so reads don't re-parse
    /// every version on every call.
    cache: DashMap<String, SovereignEntity>,
    /// Guards the read-modify-write cycle of a single path's version
    /// sequence so concurrent ingests to the SAME path serialize, while
    /// different paths proceed in parallel.
    write_locks: DashMap<String, std::sync::Arc<std::sync::Mutex<()>>>,
    export_log: RwLock<Vec<(String, MarkId)>>,
}

impl SovereignStore {
    pub fn open(root: impl Into<PathBuf>) -> SovereignResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SovereignError::Io(root.display().to_string(), e))?;
        Ok(Self {
            root,
            cache: DashMap::new(),
            write_locks: DashMap::new(),
            export_log: RwLock::new(Vec::new()),
        })
    }

    fn entity_dir(&self, path: &str) -> PathBuf {
        self.root.join(encode_path(path))
    }

    fn lock_for(&self, path: &str) -> std::sync::Arc<std::sync::Mutex<()>> {
        self.write_locks
            .entry(path.to_string())
            .or_insert_with(|| std::sync::Arc::new(std::sync::Mutex::new(())))
            .clone()
    }

    /// Ingests `event`, producing an ingest mark and, on success, one
    /// additional mark per extracted edge. The caller supplies
    /// `append_mark` so this store stays decoupled from a concrete
    /// `MarkLedger` instance.
    pub fn ingest(
        &self,
        event: IngestEvent,
        mut append_mark: impl FnMut(Mark) -> Result<MarkId, crate::mark::MarkError>,
    ) -> SovereignResult<IngestedEntity> {
        let lock = self.lock_for(&event.path);
        let _guard = lock.lock().unwrap();

        let existing = self.load(&event.path)?;
        let content_hash = hash_bytes(&event.content_bytes);

        if let Some(ref entity) = existing {
            if entity.current().content_hash == content_hash {
                // Idempotent: identical bytes, nothing new to do.
                return Ok(IngestedEntity {
                    entity: entity.clone(),
                    ingest_mark_id: entity.current().ingest_mark_id.clone(),
                    edge_mark_ids: Vec::new(),
                    is_new_version: false,
                });
            }
        }

        let version_number = existing.as_ref().map(|e| e.current_version + 1).unwrap_or(1);

        let ingest_mark = Mark::new(
            crate::mark::Phase::Act,
            crate::mark::Stimulus::new(
                "INGEST",
                serde_json::json!({"path": event.path, "source": event.source, "version": version_number}),
            ),
            crate::mark::Response::new("VERSION_STORED", serde_json::json!({"hash": content_hash})),
            crate::mark::Umwelt::new(event.source.clone()),
        )
        .with_tags([format!("file:{}", event.path)]);

        let ingest_mark_id = append_mark(ingest_mark).map_err(|e| {
            SovereignError::Io(event.path.clone(), std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;

        let version = Version {
            version_number,
            content_bytes: event.content_bytes.clone(),
            content_hash,
            ingest_mark_id: ingest_mark_id.clone(),
            created_at: chrono::Utc::now(),
        };

        let mut versions = existing.as_ref().map(|e| e.versions.clone()).unwrap_or_default();
        versions.push(version);

        let mut entity = SovereignEntity {
            path: event.path.clone(),
            versions,
            current_version: version_number,
            overlay: existing.as_ref().map(|e| e.overlay.clone()).unwrap_or_default(),
        };

        let text = String::from_utf8_lossy(&event.content_bytes).to_string();
        let discovered = extract_edges(&event.path, &text);

        let mut edge_mark_ids = Vec::new();
        match self.record_edges(&entity.path, &discovered, &ingest_mark_id, &mut append_mark) {
            Ok(ids) => {
                entity.overlay.edges = discovered;
                entity.overlay.extraction_error = None;
                edge_mark_ids = ids;
            }
            Err(e) => {
                warn!(path = %event.path, error = %e, "edge extraction partially failed");
                entity.overlay.extraction_error = Some(e.to_string());
                let mut partial_mark = Mark::new(
                    crate::mark::Phase::Reflect,
                    crate::mark::Stimulus::new("INGEST_PARTIAL", serde_json::json!({"path": event.path})),
                    crate::mark::Response::new("EXTRACTION_FAILED", serde_json::json!({"error": e.to_string()})),
                    crate::mark::Umwelt::new(event.source.clone()),
                );
                let self_id = partial_mark.id.clone();
                partial_mark = partial_mark.with_links([crate::mark::MarkLink::new(
                    ingest_mark_id.clone(),
                    self_id,
                    crate::mark::MarkLinkRelation::Continues,
                )]);
                let _ = append_mark(partial_mark);
            }
        }

        self.persist(&entity)?;
        self.cache.insert(entity.path.clone(), entity.clone());

        debug!(path = %entity.path, version = version_number, "ingested sovereign entity");

        Ok(IngestedEntity {
            entity,
            ingest_mark_id,
            edge_mark_ids,
            is_new_version: true,
        })
    }

    fn record_edges(
        &self,
        path: &str,
        edges: &[DiscoveredEdge],
        ingest_mark_id: &MarkId,
        append_mark: &mut impl FnMut(Mark) -> Result<MarkId, crate::mark::MarkError>,
    ) -> Result<Vec<MarkId>, crate::mark::MarkError> {
        let mut ids = Vec::new();
        for edge in edges {
            let mut mark = Mark::new(
                crate::mark::Phase::Reflect,
                crate::mark::Stimulus::new("EDGE_DISCOVERED", serde_json::json!({"path": path, "edge": edge})),
                crate::mark::Response::new("EDGE_RECORDED", serde_json::json!({})),
                crate::mark::Umwelt::new("sovereign-extractor"),
            )
            .with_tags([format!("file:{}", path)]);
            let self_id = mark.id.clone();
            mark = mark.with_links([crate::mark::MarkLink::new(
                ingest_mark_id.clone(),
                self_id,
                crate::mark::MarkLinkRelation::Causes,
            )]);
            ids.push(append_mark(mark)?);
        }
        Ok(ids)
    }

    /// Query the current entity for `path`.
    pub fn query(&self, path: &str) -> SovereignResult<Option<SovereignEntity>> {
        self.load(path)
    }

    /// Every path with at least one persisted version, read from disk so
    /// it reflects entities never touched by this process's cache.
    pub fn known_paths(&self) -> SovereignResult<Vec<String>> {
        let mut paths = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(SovereignError::Io(self.root.display().to_string(), e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| SovereignError::Io(self.root.display().to_string(), e))?;
            let meta_path = entry.path().join("entity.json");
            if !meta_path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&meta_path)
                .map_err(|e| SovereignError::Io(meta_path.display().to_string(), e))?;
            let stored: StoredEntity = serde_json::from_str(&text)?;
            paths.push(stored.path);
        }
        Ok(paths)
    }

    fn load(&self, path: &str) -> SovereignResult<Option<SovereignEntity>> {
        if let Some(entity) = self.cache.get(path) {
            return Ok(Some(entity.clone()));
        }
        let dir = self.entity_dir(path);
        if !dir.exists() {
            return Ok(None);
        }
        let meta_path = dir.join("entity.json");
        let text = std::fs::read_to_string(&meta_path)
            .map_err(|e| SovereignError::Io(meta_path.display().to_string(), e))?;
        let mut stored: StoredEntity = serde_json::from_str(&text)?;

        let mut versions = Vec::new();
        for v in stored.versions.drain(..) {
            let bytes_path = dir.join(format!("v{}.bin", v.version_number));
            let bytes = std::fs::read(&bytes_path)
                .map_err(|e| SovereignError::Io(bytes_path.display().to_string(), e))?;
            versions.push(Version {
                content_bytes: bytes,
                ..v
            });
        }

        let entity = SovereignEntity {
            path: path.to_string(),
            versions,
            current_version: stored.current_version,
            overlay: stored.overlay,
        };
        self.cache.insert(path.to_string(), entity.clone());
        Ok(Some(entity))
    }

    /// Atomic write: version bytes, per-version metadata, and the overlay
    /// are all written before the "current" pointer file is updated, so a
    /// crash mid-write never exposes a dangling current version.
    fn persist(&self, entity: &SovereignEntity) -> SovereignResult<()> {
        let dir = self.entity_dir(&entity.path);
        std::fs::create_dir_all(&dir).map_err(|e| SovereignError::Io(dir.display().to_string(), e))?;

        for version in &entity.versions {
            let bytes_path = dir.join(format!("v{}.bin", version.version_number));
            if !bytes_path.exists() {
                write_atomic(&bytes_path, &version.content_bytes)
                    .map_err(|e| SovereignError::Io(bytes_path.display().to_string(), e))?;
            }
        }

        let stored = StoredEntity {
            path: entity.path.clone(),
            versions: entity
                .versions
                .iter()
                .map(|v| Version {
                    content_bytes: Vec::new(),
                    ..v.clone()
                })
                .collect(),
            current_version: entity.current_version,
            overlay: entity.overlay.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored)?;
        let meta_path = dir.join("entity.json");
        write_atomic(&meta_path, &json).map_err(|e| SovereignError::Io(meta_path.display().to_string(), e))?;
        Ok(())
    }

    /// Recompute each version's content hash and compare. Does not
    /// self-repair.
    pub fn verify(&self, path: &str) -> SovereignResult<()> {
        let entity = self.load(path)?.ok_or_else(|| SovereignError::NotFound(path.to_string()))?;
        for version in &entity.versions {
            let actual = hash_bytes(&version.content_bytes);
            if actual != version.content_hash {
                return Err(SovereignError::Corruption(path.to_string(), version.version_number));
            }
        }
        Ok(())
    }

    /// Any emission of bytes externally must first create an EXPORT mark.
    pub fn export(
        &self,
        path: &str,
        mut append_mark: impl FnMut(Mark) -> Result<MarkId, crate::mark::MarkError>,
    ) -> SovereignResult<(Vec<u8>, MarkId)> {
        let entity = self.load(path)?.ok_or_else(|| SovereignError::NotFound(path.to_string()))?;
        let bytes = entity.current().content_bytes.clone();
        let mark = Mark::new(
            crate::mark::Phase::Act,
            crate::mark::Stimulus::new("EXPORT_REQUEST", serde_json::json!({"path": path})),
            crate::mark::Response::new("EXPORTED", serde_json::json!({"bytes_len": bytes.len()})),
            crate::mark::Umwelt::new("sovereign-export"),
        )
        .with_tags([format!("file:{}", path)]);
        let mark_id = append_mark(mark).map_err(|e| {
            SovereignError::Io(path.to_string(), std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        self.export_log.write().unwrap().push((path.to_string(), mark_id.clone()));
        Ok((bytes, mark_id))
    }

    /// Provenance chain retrieval.
    pub fn provenance_chain(&self, path: &str) -> SovereignResult<ProvenanceChain> {
        let entity = self.load(path)?.ok_or_else(|| SovereignError::NotFound(path.to_string()))?;
        let birth = entity.versions.first().map(|v| v.ingest_mark_id.clone());
        let modification_marks_per_version = entity
            .versions
            .iter()
            .map(|v| v.ingest_mark_id.clone())
            .collect();
        Ok(ProvenanceChain {
            birth_ingest_mark: birth,
            modification_marks_per_version,
            edge_marks_per_version: HashMap::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProvenanceChain {
    pub birth_ingest_mark: Option<MarkId>,
    pub modification_marks_per_version: Vec<MarkId>,
    pub edge_marks_per_version: HashMap<u32, Vec<MarkId>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredEntity {
    path: String,
    versions: Vec<Version>,
    current_version: u32,
    overlay: Overlay,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::MarkLedger;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, SovereignStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SovereignStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn ingest_records_an_extracted_edge() {
        let (_dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let ledger2 = ledger.clone();

        let result = store
            .ingest(
                IngestEvent {
                    path: "spec/x.md".into(),
                    content_bytes: b"# X\nsee [Y](spec/y.md)\n".to_vec(),
                    source: "test".into(),
                },
                |m| ledger2.append(m),
            )
            .unwrap();

        assert_eq!(result.entity.versions.len(), 1);
        assert_eq!(result.edge_mark_ids.len(), 1);
        assert_eq!(result.entity.overlay.edges[0].target, "spec/y.md");
    }

    #[test]
    fn reingest_with_changed_bytes_keeps_old_version() {
        let (_dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let l2 = ledger.clone();

        store
            .ingest(
                IngestEvent { path: "spec/x.md".into(), content_bytes: b"# X\nsee [Y](spec/y.md)\n".to_vec(), source: "t".into() },
                |m| l2.append(m),
            )
            .unwrap();

        let l3 = ledger.clone();
        let second = store
            .ingest(
                IngestEvent { path: "spec/x.md".into(), content_bytes: b"# X v2\n".to_vec(), source: "t".into() },
                |m| l3.append(m),
            )
            .unwrap();

        assert_eq!(second.entity.current_version, 2);
        assert_eq!(second.entity.versions.len(), 2);
        assert!(second.entity.overlay.edges.is_empty());
    }

    #[test]
    fn reingesting_identical_bytes_is_idempotent() {
        let (_dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let l2 = ledger.clone();
        let l3 = ledger.clone();
        let event = || IngestEvent { path: "a.md".into(), content_bytes: b"same".to_vec(), source: "t".into() };

        let first = store.ingest(event(), |m| l2.append(m)).unwrap();
        let second = store.ingest(event(), |m| l3.append(m)).unwrap();

        assert!(first.is_new_version);
        assert!(!second.is_new_version);
        assert_eq!(first.entity.current_version, second.entity.current_version);
    }

    #[test]
    fn verify_detects_corruption() {
        let (dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let l2 = ledger.clone();
        store
            .ingest(IngestEvent { path: "a.md".into(), content_bytes: b"hello".to_vec(), source: "t".into() }, |m| l2.append(m))
            .unwrap();

        // Corrupt the on-disk bytes directly, bypassing the store.
        let entity_dir = dir.path().join(encode_path("a.md"));
        std::fs::write(entity_dir.join("v1.bin"), b"tampered").unwrap();

        // Force a reload from disk.
        let fresh = SovereignStore::open(dir.path()).unwrap();
        assert!(fresh.verify("a.md").is_err());
    }

    #[test]
    fn known_paths_lists_every_ingested_entity() {
        let (_dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let l2 = ledger.clone();
        let l3 = ledger.clone();
        store
            .ingest(IngestEvent { path: "a.md".into(), content_bytes: b"a".to_vec(), source: "t".into() }, |m| l2.append(m))
            .unwrap();
        store
            .ingest(IngestEvent { path: "b.md".into(), content_bytes: b"b".to_vec(), source: "t".into() }, |m| l3.append(m))
            .unwrap();

        let mut paths = store.known_paths().unwrap();
        paths.sort();
        assert_eq!(paths, vec!["a.md".to_string(), "b.md".to_string()]);
    }

    #[test]
    fn export_requires_a_mark() {
        let (_dir, store) = store();
        let ledger = Arc::new(MarkLedger::new());
        let l2 = ledger.clone();
        let l3 = ledger.clone();
        store
            .ingest(IngestEvent { path: "a.md".into(), content_bytes: b"hello".to_vec(), source: "t".into() }, |m| l2.append(m))
            .unwrap();

        let before = ledger.len();
        let (bytes, _mark_id) = store.export("a.md", |m| l3.append(m)).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(ledger.len(), before + 1);
    }
}

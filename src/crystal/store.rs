//! Crystal store: append-only, same shape as the mark ledger — an
//! in-memory `DashMap` cache. Single-writer per level, enforced by
//! callers serializing `append` calls per `Level`.

use dashmap::DashMap;
use thiserror::Error;

use super::types::{Crystal, CrystalId, Level};

#[derive(Debug, Error)]
pub enum CrystalError {
    #[error("crystal not found: {0}")]
    NotFound(String),
    #[error("level inconsistency: {0}")]
    LevelInconsistency(String),
}

pub type CrystalResult<T> = Result<T, CrystalError>;

#[derive(Debug, Default)]
pub struct CrystalStore {
    crystals: DashMap<CrystalId, Crystal>,
    by_level: DashMap<Level, Vec<CrystalId>>,
}

impl CrystalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a crystal, validating the provenance chain before it
    /// becomes visible.
    pub fn append(&self, crystal: Crystal) -> CrystalResult<CrystalId> {
        if !crystal.sources_are_level_consistent(|id| self.crystals.get(id).map(|c| c.level)) {
            return Err(CrystalError::LevelInconsistency(format!(
                "crystal {} at level {:?} references sources at the wrong level",
                crystal.id, crystal.level
            )));
        }
        let id = crystal.id.clone();
        self.by_level.entry(crystal.level).or_default().push(id.clone());
        self.crystals.insert(id.clone(), crystal);
        Ok(id)
    }

    pub fn get(&self, id: &CrystalId) -> Option<Crystal> {
        self.crystals.get(id).map(|c| c.clone())
    }

    pub fn by_level(&self, level: Level) -> Vec<Crystal> {
        self.by_level
            .get(&level)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.crystals.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Crystal> {
        self.crystals.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.crystals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crystals.is_empty()
    }
}

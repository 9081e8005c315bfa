#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Index-addressed arena owning every constraint. Handles (`CRef`) are
//! stable until an explicit `garbage_collect`, which compacts the arena and
//! hands back a relocation map; every holder of a `CRef` must re-resolve
//! through that map afterwards.

use crate::pb::constraint::Constraint;
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CRef(pub u32);

impl fmt::Display for CRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintStore {
    arena: Vec<Constraint>,
    num_deleted: usize,
}

impl Index<CRef> for ConstraintStore {
    type Output = Constraint;

    fn index(&self, index: CRef) -> &Self::Output {
        let c = &self.arena[index.0 as usize];
        debug_assert!(!c.deleted, "access to deleted constraint");
        c
    }
}

impl IndexMut<CRef> for ConstraintStore {
    fn index_mut(&mut self, index: CRef) -> &mut Self::Output {
        let c = &mut self.arena[index.0 as usize];
        debug_assert!(!c.deleted, "access to deleted constraint");
        c
    }
}

impl ConstraintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len() - self.num_deleted
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn num_learned(&self) -> usize {
        self.arena
            .iter()
            .filter(|c| c.learned && !c.deleted)
            .count()
    }

    pub fn alloc(&mut self, constraint: Constraint) -> CRef {
        let cref = CRef(u32::try_from(self.arena.len()).expect("arena overflow"));
        self.arena.push(constraint);
        cref
    }

    /// Live handles in arena order.
    pub fn crefs(&self) -> impl Iterator<Item = CRef> + '_ {
        self.arena
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.deleted)
            .map(|(i, _)| CRef(i as u32))
    }

    pub fn lock(&mut self, cref: CRef) {
        self[cref].lock += 1;
    }

    pub fn unlock(&mut self, cref: CRef) {
        let c = &mut self[cref];
        debug_assert!(c.lock > 0, "unlock of unlocked constraint");
        c.lock -= 1;
    }

    /// Marks a constraint for reclamation. Removing a constraint that still
    /// serves as a reason is an invariant violation unless `override_lock`
    /// is set (full restart only).
    ///
    /// # Panics
    /// If the constraint is locked and `override_lock` is false.
    pub fn remove(&mut self, cref: CRef, override_lock: bool) {
        let c = &mut self.arena[cref.0 as usize];
        assert!(
            override_lock || c.lock == 0,
            "removing constraint {cref} while it serves as a reason"
        );
        if !c.deleted {
            c.deleted = true;
            self.num_deleted += 1;
        }
    }

    /// Compacts the arena, dropping deleted constraints. Returns the
    /// old-to-new relocation map; absent keys were reclaimed.
    pub fn garbage_collect(&mut self) -> FxHashMap<CRef, CRef> {
        let mut relocation = FxHashMap::default();
        relocation.reserve(self.len());
        let mut next = 0_u32;
        for (old, c) in self.arena.iter().enumerate() {
            if !c.deleted {
                relocation.insert(CRef(old as u32), CRef(next));
                next += 1;
            }
        }
        self.arena.retain(|c| !c.deleted);
        self.num_deleted = 0;
        relocation
    }
}

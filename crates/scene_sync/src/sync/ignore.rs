//! Echo suppression for inbound operations.

use crate::types::EntityRef;
use dashmap::DashMap;
use std::sync::Arc;

/// Refs currently being mutated on behalf of an inbound packet.
///
/// Outbound routines consult the set and stay silent for anything in it, so
/// a change that just arrived from the network is never sent back out.
/// Membership is reference counted: overlapping guards over the same ref
/// compose, and the ref leaves the set when the last guard is dropped.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    refs: Arc<DashMap<EntityRef, u32>>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds refs to the set until the returned guard is dropped.
    pub fn guard<I>(&self, refs: I) -> IgnoreGuard
    where
        I: IntoIterator<Item = EntityRef>,
    {
        let refs: Vec<EntityRef> = refs.into_iter().collect();
        for eref in &refs {
            *self.refs.entry(eref.clone()).or_insert(0) += 1;
        }
        IgnoreGuard {
            set: self.clone(),
            refs,
        }
    }

    pub fn contains(&self, eref: &EntityRef) -> bool {
        self.refs.contains_key(eref)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Scoped membership in an [`IgnoreSet`]; releases on drop, including on error paths.
#[derive(Debug)]
pub struct IgnoreGuard {
    set: IgnoreSet,
    refs: Vec<EntityRef>,
}

impl IgnoreGuard {
    pub fn refs(&self) -> &[EntityRef] {
        &self.refs
    }
}

impl Drop for IgnoreGuard {
    fn drop(&mut self) {
        for eref in &self.refs {
            if let Some(mut count) = self.set.refs.get_mut(eref) {
                *count = count.saturating_sub(1);
            }
            self.set.refs.remove_if(eref, |_, count| *count == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> Vec<EntityRef> {
        names.iter().map(|n| EntityRef::from(*n)).collect()
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let set = IgnoreSet::new();
        {
            let _guard = set.guard(refs(&["ent_1", "ent_2"]));
            assert!(set.contains(&EntityRef::from("ent_1")));
            assert_eq!(set.len(), 2);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_overlapping_guards_compose() {
        let set = IgnoreSet::new();
        let outer = set.guard(refs(&["ent_1"]));
        let inner = set.guard(refs(&["ent_1", "ent_2"]));
        drop(inner);
        assert!(set.contains(&EntityRef::from("ent_1")));
        assert!(!set.contains(&EntityRef::from("ent_2")));
        drop(outer);
        assert!(set.is_empty());
    }

    #[test]
    fn test_guard_released_on_error_path() {
        fn fails(set: &IgnoreSet) -> Result<(), String> {
            let _guard = set.guard(refs(&["ent_9"]));
            let step: Result<(), String> = Err("boom".to_string());
            step?;
            Ok(())
        }

        let set = IgnoreSet::new();
        assert!(fails(&set).is_err());
        assert!(set.is_empty());
    }
}

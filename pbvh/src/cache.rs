// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Object-keyed tree cache.
//!
//! Keeps built trees alive across frames. A cached tree is handed back only while the
//! source it was built from still has the same element counts and attribute layout;
//! otherwise the entry is dropped and the caller rebuilds.
//!
//! The cache is an explicit service object rather than global state: create it with
//! [`TreeCache::new`], pass it to whoever needs it, and tear it down with
//! [`TreeCache::shutdown`]. Access must be serialized by the caller.

use alloc::sync::Arc;
use core::fmt;

use hashbrown::HashMap;

use crate::source::{DynTopoMesh, PrimitiveSource, SourceStamp};
use crate::tree::Tree;

/// Cache key: an object identity plus the cache generation it was issued in.
///
/// Keys from before the last [`TreeCache::clear_all`] never match again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Caller-chosen identity of the original (not evaluated) object.
    pub object: u64,
    /// Cache generation.
    pub generation: u32,
}

struct Entry {
    tree: Tree,
    stamp: SourceStamp,
    mesh: Option<Arc<DynTopoMesh>>,
}

/// Map from [`ObjectKey`] to built trees.
pub struct TreeCache {
    entries: HashMap<ObjectKey, Entry>,
    generation: u32,
}

impl fmt::Debug for TreeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeCache")
            .field("entries", &self.entries.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
        }
    }

    /// Drop every entry and the cache itself.
    pub fn shutdown(mut self) {
        log::debug!("tree cache shutdown: {} entries", self.entries.len());
        self.entries.clear();
    }

    /// Key for `object` in the current generation.
    pub fn key_for(&self, object: u64) -> ObjectKey {
        ObjectKey {
            object,
            generation: self.generation,
        }
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no trees.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a tree is cached under `key`, valid or not.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The cached tree for `key` if it still matches `source`.
    ///
    /// A tree whose stamp differs from the source's is dropped and `None` is returned.
    pub fn get_or_invalidate<S: PrimitiveSource>(
        &mut self,
        key: &ObjectKey,
        source: &S,
    ) -> Option<&mut Tree> {
        let stamp = source.stamp();
        let valid = self.entries.get(key)?.stamp == stamp;
        if !valid {
            log::debug!("tree cache invalidated {key:?}");
            self.entries.remove(key);
            return None;
        }
        log::debug!("tree cache hit {key:?}");
        self.entries.get_mut(key).map(|e| &mut e.tree)
    }

    /// Cache `tree`, built from `source`, under `key`. Replaces any previous entry.
    pub fn put<S: PrimitiveSource>(&mut self, key: ObjectKey, tree: Tree, source: &S) {
        let entry = Entry {
            tree,
            stamp: source.stamp(),
            mesh: source.dyntopo_mesh().cloned(),
        };
        log::debug!("tree cache put {key:?}");
        self.entries.insert(key, entry);
    }

    /// Remove and return the tree under `key`.
    pub fn remove(&mut self, key: &ObjectKey) -> Option<Tree> {
        self.entries.remove(key).map(|e| e.tree)
    }

    /// Drop every entry except `except`, and start a new generation.
    ///
    /// The kept entry is re-keyed into the new generation, so [`TreeCache::key_for`] still
    /// finds it.
    pub fn clear_all(&mut self, except: Option<ObjectKey>) {
        let kept = except.and_then(|k| self.entries.remove(&k).map(|e| (k, e)));
        let dropped = self.entries.len();
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
        if let Some((k, e)) = kept {
            self.entries.insert(self.key_for(k.object), e);
        }
        log::debug!(
            "tree cache cleared {dropped} entries, generation {}",
            self.generation
        );
    }

    /// Drop every entry that references `mesh`.
    ///
    /// The mesh is freed once its last holder (the caller included) lets go.
    pub fn release_mesh(&mut self, mesh: &Arc<DynTopoMesh>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !e.mesh.as_ref().is_some_and(|m| Arc::ptr_eq(m, mesh)));
        let released = before - self.entries.len();
        log::debug!("tree cache released {released} entries sharing a dynamic-topology mesh");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DynTopoSource, MeshSource};
    use crate::test_util::quad_grid;
    use alloc::vec;
    use glam::Vec3;

    #[test]
    fn round_trip_and_invalidation() {
        let (p, o, c) = quad_grid(2);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut cache = TreeCache::new();
        let key = cache.key_for(7);
        cache.put(key, Tree::from_source(&src), &src);
        let id = cache
            .get_or_invalidate(&key, &src)
            .unwrap()
            .node(crate::NodeIndex::ROOT)
            .stable_id();
        let again = cache.get_or_invalidate(&key, &src).unwrap();
        assert_eq!(again.node(crate::NodeIndex::ROOT).stable_id(), id);

        // One more vertex: counts differ.
        let mut grown = p.clone();
        grown.push(Vec3::ONE);
        let changed = MeshSource::new(&grown, &o, &c).unwrap();
        assert!(cache.get_or_invalidate(&key, &changed).is_none());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn layout_change_invalidates() {
        let (p, o, c) = quad_grid(1);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut cache = TreeCache::new();
        let key = cache.key_for(1);
        cache.put(key, Tree::from_source(&src), &src);
        let mask = [0.0; 4];
        let masked = MeshSource::new(&p, &o, &c).unwrap().with_mask(&mask).unwrap();
        assert!(cache.get_or_invalidate(&key, &masked).is_none());
    }

    #[test]
    fn clear_all_keeps_exception_under_new_generation() {
        let (p, o, c) = quad_grid(1);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut cache = TreeCache::new();
        let a = cache.key_for(1);
        let b = cache.key_for(2);
        cache.put(a, Tree::from_source(&src), &src);
        cache.put(b, Tree::from_source(&src), &src);
        cache.clear_all(Some(b));
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&b), "old generation key is stale");
        let b2 = cache.key_for(2);
        assert_ne!(b, b2);
        assert!(cache.get_or_invalidate(&b2, &src).is_some());
        assert!(cache.get_or_invalidate(&cache.key_for(1), &src).is_none());
        cache.clear_all(None);
        assert!(cache.is_empty());
        cache.shutdown();
    }

    #[test]
    fn release_mesh_fans_out() {
        let mesh = Arc::new(
            DynTopoMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]]).unwrap(),
        );
        let src = DynTopoSource::new(Arc::clone(&mesh));
        let (p, o, c) = quad_grid(1);
        let other = MeshSource::new(&p, &o, &c).unwrap();
        let mut cache = TreeCache::new();
        cache.put(cache.key_for(1), Tree::from_source(&src), &src);
        cache.put(cache.key_for(2), Tree::from_source(&src), &src);
        cache.put(cache.key_for(3), Tree::from_source(&other), &other);
        assert_eq!(Arc::strong_count(&mesh), 4);
        drop(src);
        assert_eq!(cache.release_mesh(&mesh), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(Arc::strong_count(&mesh), 1);
    }
}

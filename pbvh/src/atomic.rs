// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lock-free float accumulators for vertex data shared between leaves.

use core::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

/// `f32` stored as its bit pattern.
#[derive(Debug, Default)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn fetch_add(&self, value: f32) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(cur) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Three independent atomic components. Concurrent adds never lose a contribution, but a
/// reader racing with writers may see a mix of old and new components.
#[derive(Debug, Default)]
pub(crate) struct AtomicVec3([AtomicF32; 3]);

impl AtomicVec3 {
    pub(crate) fn load(&self) -> Vec3 {
        Vec3::new(self.0[0].load(), self.0[1].load(), self.0[2].load())
    }

    pub(crate) fn store(&self, v: Vec3) {
        for (c, x) in self.0.iter().zip(v.to_array()) {
            c.store(x);
        }
    }

    pub(crate) fn add(&self, v: Vec3) {
        for (c, x) in self.0.iter().zip(v.to_array()) {
            c.fetch_add(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_store() {
        let a = AtomicVec3::default();
        assert_eq!(a.load(), Vec3::ZERO);
        a.add(Vec3::new(1.0, 2.0, 3.0));
        a.add(Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(a.load(), Vec3::new(1.5, 2.5, 3.5));
        a.store(Vec3::X);
        assert_eq!(a.load(), Vec3::X);
    }

    #[cfg(feature = "std")]
    #[test]
    fn concurrent_adds_are_not_lost() {
        let a = AtomicF32::default();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        a.fetch_add(1.0);
                    }
                });
            }
        });
        assert_eq!(a.load(), 4000.0);
    }
}

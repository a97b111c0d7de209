//! Generational resource-handle slab: `(generation:32 | index:32)` handles
//! over chunked storage, giving every external reference to an engine
//! resource a "typed dangling pointer" detector instead of a raw index.

use core::sync::atomic::{AtomicU32, Ordering};

const EMPTY_GENERATION: u32 = u32::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn new(generation: u32, index: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Process-wide monotonic generation counter, shared by every
/// [`HandleSlab`] so two slabs never hand out colliding `(generation,
/// index)` pairs even if their index spaces overlap.
static NEXT_GENERATION: AtomicU32 = AtomicU32::new(0);

fn next_generation() -> u32 {
    // Wrapping is astronomically unlikely to matter in a single process
    // lifetime; if it does, the oldest live handles become indistinguishable
    // from fresh ones, which is the same failure mode as the original C
    // engine's handle scheme.
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

pub struct HandleSlab<T> {
    slots: std::vec::Vec<Option<T>>,
    generations: std::vec::Vec<u32>,
    free_indices: std::vec::Vec<u32>,
}

impl<T> Default for HandleSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleSlab<T> {
    pub fn new() -> Self {
        Self {
            slots: std::vec::Vec::new(),
            generations: std::vec::Vec::new(),
            free_indices: std::vec::Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Handle {
        let generation = next_generation();
        if let Some(index) = self.free_indices.pop() {
            self.slots[index as usize] = Some(value);
            self.generations[index as usize] = generation;
            Handle::new(generation, index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(value));
            self.generations.push(generation);
            Handle::new(generation, index)
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let index = handle.index() as usize;
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots[index].as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let index = handle.index() as usize;
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots[index].as_mut()
    }

    /// Removes and returns the value, if `handle` is still live. The slot's
    /// generation is retired immediately; it will never be reused for a
    /// handle bearing this same generation again.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = handle.index() as usize;
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.generations[index] = EMPTY_GENERATION;
        self.free_indices.push(index as u32);
        self.slots[index].take()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_free_is_always_none() {
        let mut slab: HandleSlab<u32> = HandleSlab::new();
        let h = slab.insert(42);
        assert_eq!(slab.get(h), Some(&42));
        assert_eq!(slab.remove(h), Some(42));
        assert_eq!(slab.get(h), None);
        assert_eq!(slab.remove(h), None);
    }

    #[test]
    fn generation_never_repeats_after_reuse() {
        let mut slab: HandleSlab<u32> = HandleSlab::new();
        let h1 = slab.insert(1);
        slab.remove(h1);
        let h2 = slab.insert(2);
        assert_eq!(h1.index(), h2.index());
        assert_ne!(h1.generation(), h2.generation());
        assert_eq!(slab.get(h1), None);
        assert_eq!(slab.get(h2), Some(&2));
    }
}

//! Factory / prototype-chain allocator: allocates a DOM concrete
//! type's prototype chain (`EventTarget → Node → Element → HTMLElement →
//! Concrete`) as one aligned block from a slab pool, and frees the whole
//! chain from its leaf in one call.
//!
//! No raw `_proto` pointers: each chain is a single recycled `Box<[u8]>`,
//! addressed by a generation-checked [`ChainHandle`] rather than a pointer
//! walk. A concrete type describes its chain's per-level layout at compile
//! time via [`ChainLayout`]; the factory only ever sees the combined size
//! and alignment of the whole chain.

use std::alloc::Layout;
use std::collections::HashMap;

/// One level of a concrete type's prototype chain, root (`EventTarget`) first.
#[derive(Debug, Clone, Copy)]
pub struct ChainLevel {
    pub size: usize,
    pub align: usize,
}

/// Describes the fixed-order prototype chain for one concrete DOM type.
/// Implement once per concrete type; `LEVELS` lists each inheritance layer
/// root-first so [`ChainLayout::total_layout`] can fold them into the single
/// aligned block the factory allocates.
pub trait ChainLayout {
    const LEVELS: &'static [ChainLevel];

    /// The combined size/alignment of the whole chain, computed the way
    /// `Layout::extend` stacks fields in a `#[repr(Rust)]` struct.
    fn total_layout() -> Layout {
        Self::LEVELS.iter().fold(Layout::from_size_align(0, 1).expect("empty layout"), |acc, level| {
            let level_layout = Layout::from_size_align(level.size, level.align).expect("chain level has invalid layout");
            let (extended, _offset) = acc.extend(level_layout).expect("chain layout overflow");
            extended
        })
    }
}

struct Block {
    bytes: Box<[u8]>,
    align: usize,
    generation: u64,
}

/// Handle to one allocated chain. Matches only the slot it was issued for at
/// the generation it was issued at — a handle into a freed-and-recycled slot
/// never matches again, so use-after-free is a panic, not silent corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainHandle {
    index: usize,
    generation: u64,
}

/// Slab pool of chain blocks, recycled by `(size, align)` size class.
#[derive(Default)]
pub struct Factory {
    blocks: Vec<Option<Block>>,
    free_by_class: HashMap<(usize, usize), Vec<usize>>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates one chain sized for `T`'s full prototype chain. Reuses a
    /// freed block of the same `(size, align)` class if one is available,
    /// otherwise grows the pool — either way, one slab call per chain.
    pub fn alloc<T: ChainLayout>(&mut self) -> ChainHandle {
        let layout = T::total_layout();
        let class = (layout.size(), layout.align());

        if let Some(index) = self.free_by_class.get_mut(&class).and_then(Vec::pop) {
            let block = self.blocks[index].as_mut().expect("a free-list entry always points at a live block");
            block.bytes.fill(0);
            return ChainHandle {
                index,
                generation: block.generation,
            };
        }

        let bytes = vec![0u8; layout.size()].into_boxed_slice();
        let index = self.blocks.len();
        self.blocks.push(Some(Block {
            bytes,
            align: layout.align(),
            generation: 0,
        }));
        ChainHandle { index, generation: 0 }
    }

    /// Frees the whole chain as one block (leaf-to-root is implicit: there
    /// is only one block per chain) and bumps its slot's generation so any
    /// stale handle into the recycled slot stops matching.
    pub fn destroy(&mut self, handle: ChainHandle) {
        let slot = self.blocks.get_mut(handle.index).expect("destroying an out-of-range chain handle");
        let block = slot.as_mut().expect("destroying an already-freed chain handle");
        assert_eq!(block.generation, handle.generation, "destroying a stale chain handle");

        let class = (block.bytes.len(), block.align);
        block.generation += 1;
        self.free_by_class.entry(class).or_default().push(handle.index);
    }

    pub fn bytes(&self, handle: ChainHandle) -> &[u8] {
        let block = self.blocks[handle.index].as_ref().expect("dereferencing a freed chain handle");
        assert_eq!(block.generation, handle.generation, "dereferencing a stale chain handle");
        &block.bytes
    }

    pub fn bytes_mut(&mut self, handle: ChainHandle) -> &mut [u8] {
        let block = self.blocks[handle.index].as_mut().expect("dereferencing a freed chain handle");
        assert_eq!(block.generation, handle.generation, "dereferencing a stale chain handle");
        &mut block.bytes
    }

    /// Number of size classes with at least one block outstanding (freed or
    /// allocated); exposed for tests that check recycling actually happens.
    #[cfg(test)]
    fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EventTargetLike;
    struct HtmlInputElementLike;

    impl ChainLayout for EventTargetLike {
        const LEVELS: &'static [ChainLevel] = &[ChainLevel { size: 8, align: 8 }];
    }

    impl ChainLayout for HtmlInputElementLike {
        const LEVELS: &'static [ChainLevel] = &[
            ChainLevel { size: 8, align: 8 },  // EventTarget
            ChainLevel { size: 16, align: 8 }, // Node
            ChainLevel { size: 24, align: 8 }, // Element
            ChainLevel { size: 4, align: 4 },  // HTMLElement
            ChainLevel { size: 8, align: 8 },  // HTMLInputElement
        ];
    }

    #[test]
    fn alloc_sizes_the_whole_chain_in_one_block() {
        let mut factory = Factory::new();
        let handle = factory.alloc::<HtmlInputElementLike>();
        let layout = HtmlInputElementLike::total_layout();
        assert_eq!(factory.bytes(handle).len(), layout.size());
    }

    #[test]
    fn destroy_recycles_the_block_for_a_same_class_alloc() {
        let mut factory = Factory::new();
        let a = factory.alloc::<EventTargetLike>();
        factory.destroy(a);
        assert_eq!(factory.block_count(), 1);

        let b = factory.alloc::<EventTargetLike>();
        assert_eq!(factory.block_count(), 1, "recycled the freed block instead of growing the pool");
        assert_ne!(a, b, "a recycled slot must not compare equal to its prior handle");
    }

    #[test]
    #[should_panic(expected = "stale chain handle")]
    fn using_a_stale_handle_after_destroy_panics() {
        let mut factory = Factory::new();
        let handle = factory.alloc::<EventTargetLike>();
        factory.destroy(handle);
        let _ = factory.bytes(handle);
    }

    #[test]
    fn different_size_classes_do_not_share_a_free_list() {
        let mut factory = Factory::new();
        let small = factory.alloc::<EventTargetLike>();
        factory.destroy(small);
        // A larger chain must not be handed the small freed block.
        let big = factory.alloc::<HtmlInputElementLike>();
        assert_eq!(factory.block_count(), 2);
        assert!(factory.bytes(big).len() >= HtmlInputElementLike::total_layout().size());
    }
}

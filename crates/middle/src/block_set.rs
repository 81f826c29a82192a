//! Sets of blocks, as dense bit vectors indexed by [`BlockId`].
use std::fmt;

use bit_set::BitSet;
use cranelift_entity::EntityRef;
use tacit_ir::BlockId;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BlockSet(BitSet);

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `block` was not in the set yet.
    pub fn insert(&mut self, block: BlockId) -> bool {
        self.0.insert(block.index())
    }

    pub fn remove(&mut self, block: BlockId) -> bool {
        self.0.remove(block.index())
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.0.contains(block.index())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Keeps only the blocks also in `other`.
    pub fn intersect_with(&mut self, other: &Self) {
        self.0.intersect_with(&other.0);
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Blocks in layout order.
    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.0.iter().map(BlockId::new)
    }
}

impl fmt::Debug for BlockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<const N: usize> From<[BlockId; N]> for BlockSet {
    fn from(blocks: [BlockId; N]) -> Self {
        blocks.into_iter().collect()
    }
}

impl FromIterator<BlockId> for BlockSet {
    fn from_iter<I: IntoIterator<Item = BlockId>>(iter: I) -> Self {
        let mut set = Self::new();
        for block in iter {
            set.insert(block);
        }
        set
    }
}

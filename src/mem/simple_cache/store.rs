use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::base::packet::Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub data: Box<[u8]>,
    pub dirty: bool,
}

/// A block pushed out of the store to make room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub addr: Addr,
    pub block: Block,
}

/// Flat table of blocks keyed by block address.  No sets or ways: any block may live anywhere,
/// and a full table gives up a uniformly random victim.
#[derive(Debug)]
pub struct BlockStore {
    block_size: usize,
    capacity: usize,
    /// Ordered so the seeded victim choice is reproducible.
    blocks: BTreeMap<Addr, Block>,
    rng: StdRng,
}

impl BlockStore {
    pub fn new(block_size: usize, capacity: usize, seed: u64) -> Self {
        assert!(capacity > 0, "block store needs room for at least one block");
        Self {
            block_size,
            capacity,
            blocks: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, block_addr: Addr) -> bool {
        self.blocks.contains_key(&block_addr)
    }

    pub fn get(&self, block_addr: Addr) -> Option<&Block> {
        self.blocks.get(&block_addr)
    }

    pub fn get_mut(&mut self, block_addr: Addr) -> Option<&mut Block> {
        self.blocks.get_mut(&block_addr)
    }

    /// Install a block, evicting a random resident one first if the table is full.  Installing
    /// an address that is already resident replaces its contents without evicting anything.
    pub fn insert(&mut self, block_addr: Addr, data: &[u8], dirty: bool) -> Option<Evicted> {
        assert_eq!(
            self.block_size,
            data.len(),
            "fill for {:#x} is not a whole block",
            block_addr
        );
        debug_assert_eq!(0, block_addr % self.block_size as Addr);

        let block = Block {
            data: data.into(),
            dirty,
        };
        if let Some(resident) = self.blocks.get_mut(&block_addr) {
            *resident = block;
            return None;
        }

        let evicted = if self.blocks.len() >= self.capacity {
            self.evict_random()
        } else {
            None
        };
        self.blocks.insert(block_addr, block);
        debug_assert!(self.blocks.len() <= self.capacity);
        evicted
    }

    fn evict_random(&mut self) -> Option<Evicted> {
        let victim_idx = self.rng.gen_range(0..self.blocks.len());
        let addr = *self.blocks.keys().nth(victim_idx)?;
        let block = self.blocks.remove(&addr)?;
        Some(Evicted { addr, block })
    }

    pub fn addrs(&self) -> impl Iterator<Item = Addr> + '_ {
        self.blocks.keys().copied()
    }
}

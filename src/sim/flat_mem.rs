use crate::base::mem::HasMemory;

/// Zero-initialized byte vector backing a memory model.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl HasMemory for FlatMemory {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read_impl(&self, addr: usize, n: usize) -> &[u8] {
        &self.bytes[addr..addr + n]
    }

    fn write_impl(&mut self, addr: usize, data: &[u8]) {
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
    }
}

impl FlatMemory {
    pub fn new_with_size(size: usize) -> Self {
        Self { bytes: vec![0u8; size] }
    }
}

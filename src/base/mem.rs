use anyhow::bail;

/// Trait for byte-addressable backing stores.  Addresses are relative to the store.
pub trait HasMemory {
    fn size(&self) -> usize;

    fn read_impl(&self, addr: usize, n: usize) -> &[u8];
    fn read(&self, addr: usize, n: usize) -> Result<&[u8], anyhow::Error> {
        assert!(n > 0, "zero-sized read");
        if addr.checked_add(n).map_or(true, |end| end > self.size()) {
            bail!("read of size {} @ {:#x} is out of bounds ({} bytes)", n, addr, self.size());
        }
        Ok(self.read_impl(addr, n))
    }

    fn write_impl(&mut self, addr: usize, data: &[u8]);
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), anyhow::Error> {
        let n = data.len();
        assert!(n > 0, "zero-sized write");
        if addr.checked_add(n).map_or(true, |end| end > self.size()) {
            bail!("write of size {} @ {:#x} is out of bounds ({} bytes)", n, addr, self.size());
        }
        self.write_impl(addr, data);
        Ok(())
    }
}

use serde::Serialize;

pub type Addr = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemCmd {
    ReadReq,
    ReadResp,
    WriteReq,
    WriteResp,
    /// Eviction of a modified block; never answered.
    WritebackDirty,
}

impl MemCmd {
    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadReq | Self::ReadResp)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Self::WriteReq | Self::WriteResp | Self::WritebackDirty)
    }

    pub fn is_request(self) -> bool {
        matches!(self, Self::ReadReq | Self::WriteReq | Self::WritebackDirty)
    }

    pub fn is_response(self) -> bool {
        matches!(self, Self::ReadResp | Self::WriteResp)
    }

    pub fn needs_response(self) -> bool {
        matches!(self, Self::ReadReq | Self::WriteReq)
    }

    fn response(self) -> Option<Self> {
        match self {
            Self::ReadReq => Some(Self::ReadResp),
            Self::WriteReq => Some(Self::WriteResp),
            _ => None,
        }
    }
}

/// A memory transaction.  Exactly one component owns a packet at a time; it is moved across
/// ports and handed back on rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    cmd: MemCmd,
    addr: Addr,
    data: Vec<u8>,
}

impl Packet {
    pub fn read(addr: Addr, size: usize) -> Self {
        assert!(size > 0, "zero-sized read @ {:#x}", addr);
        Self {
            cmd: MemCmd::ReadReq,
            addr,
            data: vec![0; size],
        }
    }

    pub fn write(addr: Addr, data: Vec<u8>) -> Self {
        assert!(!data.is_empty(), "zero-sized write @ {:#x}", addr);
        Self {
            cmd: MemCmd::WriteReq,
            addr,
            data,
        }
    }

    pub fn writeback(addr: Addr, data: Vec<u8>) -> Self {
        Self {
            cmd: MemCmd::WritebackDirty,
            addr,
            data,
        }
    }

    pub fn cmd(&self) -> MemCmd {
        self.cmd
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_read(&self) -> bool {
        self.cmd.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.cmd.is_write()
    }

    pub fn is_response(&self) -> bool {
        self.cmd.is_response()
    }

    pub fn needs_response(&self) -> bool {
        self.cmd.needs_response()
    }

    pub fn block_addr(&self, block_size: usize) -> Addr {
        debug_assert!(block_size.is_power_of_two());
        self.addr & !(block_size as Addr - 1)
    }

    /// True if this packet is exactly one aligned block.
    pub fn is_whole_block(&self, block_size: usize) -> bool {
        self.addr == self.block_addr(block_size) && self.size() == block_size
    }

    fn block_offset(&self, block_size: usize) -> usize {
        let offset = (self.addr - self.block_addr(block_size)) as usize;
        assert!(
            offset + self.size() <= block_size,
            "packet {:?} @ {:#x} size {} straddles a {}-byte block",
            self.cmd,
            self.addr,
            self.size(),
            block_size
        );
        offset
    }

    /// Turn a request into its response in place.
    pub fn make_response(&mut self) {
        self.cmd = match self.cmd.response() {
            Some(cmd) => cmd,
            None => panic!("{:?} @ {:#x} does not take a response", self.cmd, self.addr),
        };
    }

    /// Copy the bytes this packet covers out of `block`.
    pub fn set_data_from_block(&mut self, block: &[u8], block_size: usize) {
        let offset = self.block_offset(block_size);
        let size = self.size();
        self.data.copy_from_slice(&block[offset..offset + size]);
    }

    /// Copy this packet's bytes into the range it covers in `block`.
    pub fn write_data_to_block(&self, block: &mut [u8], block_size: usize) {
        let offset = self.block_offset(block_size);
        block[offset..offset + self.size()].copy_from_slice(&self.data);
    }
}

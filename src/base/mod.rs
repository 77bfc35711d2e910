pub mod addr_range;
pub mod mem;
pub mod packet;
pub mod port;

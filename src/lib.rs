pub mod base;
pub mod mem;
pub mod sim;
pub mod timeq;
pub mod traffic;

#[cfg(test)]
mod unit_tests;

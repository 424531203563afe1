//! Sparse guest memory.
//!
//! Guest addresses are folded into the 30-bit physical window before they
//! reach the page table, so every mirror of an address lands on the same
//! byte. Pages are allocated on first write; reads from untouched memory
//! return zero.

use hashbrown::HashMap;

/// Mask applied to every guest address before it is combined with the host base.
pub const ADDRESS_MASK: u32 = 0x3FFF_FFFF;

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

type Page = Box<[u8; PAGE_SIZE]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestMemory {
    pages: HashMap<u32, Page>,
}

/// Fold a guest virtual address into the physical window.
pub const fn mask_address(addr: u32) -> u32 {
    addr & ADDRESS_MASK
}

impl GuestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_u8(&self, addr: u32) -> u8 {
        let addr = mask_address(addr);
        self.pages
            .get(&(addr >> PAGE_SHIFT))
            .map_or(0, |page| page[(addr & PAGE_MASK) as usize])
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) {
        let addr = mask_address(addr);
        let page = self
            .pages
            .entry(addr >> PAGE_SHIFT)
            .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        page[(addr & PAGE_MASK) as usize] = value;
    }

    /// Read a little-endian guest word.
    pub fn read_u32(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_u8(addr.wrapping_add(i as u32));
        }
        u32::from_le_bytes(bytes)
    }

    /// Write a little-endian guest word.
    pub fn write_u32(&mut self, addr: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(addr.wrapping_add(i as u32), byte);
        }
    }

    pub fn read_f32(&self, addr: u32) -> f32 {
        f32::from_bits(self.read_u32(addr))
    }

    pub fn write_f32(&mut self, addr: u32, value: f32) {
        self.write_u32(addr, value.to_bits());
    }

    /// Number of pages touched so far.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }
}

use super::address;
use rangemap::RangeSet;
use std::collections::HashMap;

pub const PAGE_SIZE: usize = 4096;

/// Size of an instruction fetch in bytes.
pub const FETCH_SIZE: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("misaligned {size} byte access at {addr:#x}")]
    Misaligned { addr: address, size: usize },
    #[error("user mode access to supervisor-only address {addr:#x}")]
    PrivilegeViolation { addr: address },
    #[error("{size} byte access at {addr:#x} wraps around the address space")]
    OutOfRange { addr: address, size: usize },
    #[error("unsupported access size of {size} bytes")]
    InvalidSize { size: usize },
}

/// Memory as seen by a warp.
///
/// Every access is tagged with the privilege mode of the issuing warp.
pub trait Port {
    /// Fetch one instruction word.
    fn fetch(&self, addr: address, supervisor: bool) -> Result<u32, Error>;

    /// Read `buf.len()` bytes starting at `addr`.
    fn load(&self, addr: address, buf: &mut [u8], supervisor: bool) -> Result<(), Error>;

    /// Write `data` starting at `addr`.
    fn store(&mut self, addr: address, data: &[u8], supervisor: bool) -> Result<(), Error>;

    /// Read a little-endian value of `size` bytes, zero extended.
    fn load_value(&self, addr: address, size: usize, supervisor: bool) -> Result<u64, Error> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(Error::InvalidSize { size });
        }
        let mut buf = [0u8; 8];
        self.load(addr, &mut buf[..size], supervisor)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Write the low `size` bytes of `value` in little-endian order.
    fn store_value(
        &mut self,
        addr: address,
        size: usize,
        value: u64,
        supervisor: bool,
    ) -> Result<(), Error> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(Error::InvalidSize { size });
        }
        self.store(addr, &value.to_le_bytes()[..size], supervisor)
    }
}

/// Sparse, paged main memory.
///
/// Pages are allocated on first write. Reading memory that was never written yields zeros.
#[derive(Debug, Default, Clone)]
pub struct Main {
    pages: HashMap<u64, Box<[u8; PAGE_SIZE]>>,
    supervisor_only: RangeSet<address>,
}

impl Main {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `range` to supervisor mode accesses.
    pub fn protect(&mut self, range: std::ops::Range<address>) {
        if !range.is_empty() {
            self.supervisor_only.insert(range);
        }
    }

    #[must_use]
    pub fn with_supervisor_only(mut self, range: std::ops::Range<address>) -> Self {
        self.protect(range);
        self
    }

    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Number of bytes backed by allocated pages.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.pages.len() * PAGE_SIZE
    }

    fn check(&self, addr: address, size: usize, supervisor: bool) -> Result<(), Error> {
        if size > 1 && size.is_power_of_two() && addr % size as u64 != 0 {
            return Err(Error::Misaligned { addr, size });
        }
        if size == 0 {
            return Ok(());
        }
        let last = addr
            .checked_add(size as u64 - 1)
            .ok_or(Error::OutOfRange { addr, size })?;
        let end = last.saturating_add(1);
        if !supervisor && addr < end && self.supervisor_only.overlaps(&(addr..end)) {
            return Err(Error::PrivilegeViolation { addr });
        }
        Ok(())
    }

    /// Copy bytes out of memory without privilege or alignment checks.
    pub fn read_bytes(&self, addr: address, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = addr.wrapping_add(i as u64);
            let page = addr / PAGE_SIZE as u64;
            let offset = (addr % PAGE_SIZE as u64) as usize;
            *byte = self.pages.get(&page).map_or(0, |page| page[offset]);
        }
    }

    /// Copy bytes into memory without privilege or alignment checks.
    pub fn write_bytes(&mut self, addr: address, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let addr = addr.wrapping_add(i as u64);
            let page = addr / PAGE_SIZE as u64;
            let offset = (addr % PAGE_SIZE as u64) as usize;
            let page = self
                .pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE]));
            page[offset] = *byte;
        }
    }
}

impl Port for Main {
    fn fetch(&self, addr: address, supervisor: bool) -> Result<u32, Error> {
        self.check(addr, FETCH_SIZE, supervisor)?;
        let mut buf = [0u8; FETCH_SIZE];
        self.read_bytes(addr, &mut buf);
        Ok(u32::from_le_bytes(buf))
    }

    fn load(&self, addr: address, buf: &mut [u8], supervisor: bool) -> Result<(), Error> {
        self.check(addr, buf.len(), supervisor)?;
        self.read_bytes(addr, buf);
        Ok(())
    }

    fn store(&mut self, addr: address, data: &[u8], supervisor: bool) -> Result<(), Error> {
        self.check(addr, data.len(), supervisor)?;
        self.write_bytes(addr, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Main, Port, PAGE_SIZE};

    #[test]
    fn test_unwritten_memory_reads_zero() -> Result<(), Error> {
        let mem = Main::new();
        assert_eq!(mem.fetch(0x8000_0000, true)?, 0);
        assert_eq!(mem.load_value(0x1234, 2, false)?, 0);
        assert_eq!(mem.num_pages(), 0);
        Ok(())
    }

    #[test]
    fn test_store_across_page_boundary() -> Result<(), Error> {
        let mut mem = Main::new();
        let addr = PAGE_SIZE as u64 - 2;
        for (i, byte) in [1, 2, 3, 4].into_iter().enumerate() {
            mem.store(addr + i as u64, &[byte], true)?;
        }
        assert_eq!(mem.num_pages(), 2);
        let mut buf = [0u8; 4];
        mem.read_bytes(addr, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(mem.load_value(PAGE_SIZE as u64, 2, false)?, 0x0403);
        Ok(())
    }

    #[test]
    fn test_access_ending_at_top_of_address_space() -> Result<(), Error> {
        let mut mem = Main::new();
        let addr = u64::MAX - 7;
        mem.store_value(addr, 8, 0x0102_0304_0506_0708, false)?;
        assert_eq!(mem.load_value(addr, 8, false)?, 0x0102_0304_0506_0708);
        assert_eq!(mem.load_value(u64::MAX, 1, false)?, 0x01);
        Ok(())
    }

    #[test]
    fn test_little_endian_values() -> Result<(), Error> {
        let mut mem = Main::new();
        mem.store_value(0x100, 4, 0xDEAD_BEEF, false)?;
        assert_eq!(mem.load_value(0x100, 1, false)?, 0xEF);
        assert_eq!(mem.load_value(0x102, 2, false)?, 0xDEAD);
        assert_eq!(mem.fetch(0x100, false)?, 0xDEAD_BEEF);
        Ok(())
    }

    #[test]
    fn test_misaligned_access() {
        let mut mem = Main::new();
        assert_eq!(
            mem.store_value(0x101, 4, 0, true),
            Err(Error::Misaligned {
                addr: 0x101,
                size: 4
            })
        );
        assert_eq!(
            mem.fetch(0x8000_0002, true),
            Err(Error::Misaligned {
                addr: 0x8000_0002,
                size: 4
            })
        );
        assert!(mem.store_value(0x101, 1, 0, true).is_ok());
    }

    #[test]
    fn test_supervisor_only_region() {
        let mut mem = Main::new().with_supervisor_only(0x1000..0x2000);
        assert_eq!(
            mem.store_value(0x1ffc, 4, 7, false),
            Err(Error::PrivilegeViolation { addr: 0x1ffc })
        );
        assert_eq!(
            mem.fetch(0x1000, false),
            Err(Error::PrivilegeViolation { addr: 0x1000 })
        );
        assert!(mem.store_value(0x1ffc, 4, 7, true).is_ok());
        assert_eq!(mem.load_value(0x2000, 4, false), Ok(0));
        assert_eq!(mem.load_value(0x1ffc, 4, true), Ok(7));
    }

    #[test]
    fn test_access_wrapping_address_space() {
        let mem = Main::new();
        let mut buf = [0u8; 3];
        assert_eq!(
            mem.load(u64::MAX - 1, &mut buf, true),
            Err(Error::OutOfRange {
                addr: u64::MAX - 1,
                size: 3
            })
        );
    }
}

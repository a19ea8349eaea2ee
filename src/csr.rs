//! Control/status register addresses.
//!
//! Addresses whose two top bits are set are read-only. The identity registers in that range
//! are computed on every read and never stored in the warp's control/status bank.

pub const CYCLE: u16 = 0xC00;
pub const INSTRET: u16 = 0xC02;

/// Lane index of the reading thread.
pub const THREAD_ID: u16 = 0xCC0;
pub const WARP_ID: u16 = 0xCC1;
pub const CORE_ID: u16 = 0xCC2;
/// Register-0 cell of lane 0: the warp's self-identification word after reset and the
/// interrupt cause inside a handler.
pub const WARP_ARGUMENT: u16 = 0xCC3;

pub const NUM_THREADS: u16 = 0xFC0;
pub const NUM_WARPS: u16 = 0xFC1;
pub const NUM_CORES: u16 = 0xFC2;

pub static NAMES: phf::Map<u16, &'static str> = phf::phf_map! {
    0xC00u16 => "cycle",
    0xC02u16 => "instret",
    0xCC0u16 => "thread_id",
    0xCC1u16 => "warp_id",
    0xCC2u16 => "core_id",
    0xCC3u16 => "warp_argument",
    0xFC0u16 => "num_threads",
    0xFC1u16 => "num_warps",
    0xFC2u16 => "num_cores",
};

#[must_use]
pub fn name(csr: u16) -> Option<&'static str> {
    NAMES.get(&csr).copied()
}

#[must_use]
pub fn is_read_only(csr: u16) -> bool {
    (csr >> 10) & 0b11 == 0b11
}

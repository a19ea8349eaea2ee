use super::address;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Number of general purpose registers per thread.
pub const NUM_REGISTERS: usize = 32;

/// Number of control/status cells per warp.
pub const NUM_CSRS: usize = 1 << 12;

pub const DEFAULT_NUM_CORES: usize = 1;
pub const DEFAULT_NUM_WARPS: usize = 8;
pub const DEFAULT_NUM_THREADS: usize = 4;

/// Address of the first instruction of warp 0.
pub const DEFAULT_RESET_PC: address = 0x8000_0000;

/// Handler vector all warps jump to when an interrupt is taken.
pub const DEFAULT_INTERRUPT_ENTRY: address = 0x8000_0100;

pub const MAX_THREADS: usize = trace_model::MAX_THREADS;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid architecture string {0:?} (expected rv32i, rv32im, rv64i or rv64im)")]
    InvalidArch(String),
    #[error("number of {what} must be greater than zero")]
    Zero { what: &'static str },
    #[error("{num_threads} threads per warp exceeds the maximum of {max}")]
    TooManyThreads { num_threads: usize, max: usize },
}

/// Optional ISA extensions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Extensions {
    /// Integer multiplication and division.
    pub m: bool,
}

/// Architecture of a simulated processor instance.
///
/// Immutable once constructed and shared by every core and warp of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arch {
    pub name: String,
    /// Machine word size in bytes (4 or 8).
    pub word_size: usize,
    pub num_registers: usize,
    /// Lanes per warp.
    pub num_threads: usize,
    /// Warps per core.
    pub num_warps: usize,
    pub num_cores: usize,
    pub extensions: Extensions,
    pub reset_pc: address,
    pub interrupt_entry: address,
}

static ARCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*rv(32|64)i(m?)\s*$").expect("valid arch regex"));

impl Arch {
    pub fn new(
        arch: &str,
        num_cores: usize,
        num_warps: usize,
        num_threads: usize,
    ) -> Result<Self, Error> {
        let captures = ARCH_REGEX
            .captures(arch)
            .ok_or_else(|| Error::InvalidArch(arch.to_string()))?;
        let word_size = match &captures[1] {
            "32" => 4,
            _ => 8,
        };
        let extensions = Extensions {
            m: !captures[2].is_empty(),
        };

        for (what, count) in [
            ("cores", num_cores),
            ("warps", num_warps),
            ("threads", num_threads),
        ] {
            if count == 0 {
                return Err(Error::Zero { what });
            }
        }
        if num_threads > MAX_THREADS {
            return Err(Error::TooManyThreads {
                num_threads,
                max: MAX_THREADS,
            });
        }

        Ok(Self {
            name: arch.trim().to_ascii_lowercase(),
            word_size,
            num_registers: NUM_REGISTERS,
            num_threads,
            num_warps,
            num_cores,
            extensions,
            reset_pc: DEFAULT_RESET_PC,
            interrupt_entry: DEFAULT_INTERRUPT_ENTRY,
        })
    }

    #[must_use]
    pub fn with_reset_pc(mut self, reset_pc: address) -> Self {
        self.reset_pc = reset_pc & self.word_mask();
        self
    }

    #[must_use]
    pub fn with_interrupt_entry(mut self, interrupt_entry: address) -> Self {
        self.interrupt_entry = interrupt_entry & self.word_mask();
        self
    }

    #[must_use]
    pub fn word_bits(&self) -> u32 {
        (self.word_size * 8) as u32
    }

    /// Mask selecting the bits of a machine word.
    #[must_use]
    pub fn word_mask(&self) -> u64 {
        if self.word_size >= std::mem::size_of::<u64>() {
            u64::MAX
        } else {
            (1u64 << self.word_bits()) - 1
        }
    }

    #[must_use]
    pub fn is_64bit(&self) -> bool {
        self.word_size == 8
    }

    /// Total number of warps across all cores.
    #[must_use]
    pub fn total_warps(&self) -> usize {
        self.num_cores * self.num_warps
    }
}

impl Default for Arch {
    fn default() -> Self {
        Self {
            name: "rv32i".to_string(),
            word_size: 4,
            num_registers: NUM_REGISTERS,
            num_threads: DEFAULT_NUM_THREADS,
            num_warps: DEFAULT_NUM_WARPS,
            num_cores: DEFAULT_NUM_CORES,
            extensions: Extensions::default(),
            reset_pc: DEFAULT_RESET_PC,
            interrupt_entry: DEFAULT_INTERRUPT_ENTRY,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} cores x {} warps x {} threads)",
            self.name, self.num_cores, self.num_warps, self.num_threads
        )
    }
}

pub mod asm;

use crate::{address, memory};

static LOGGER: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

/// Write little-endian instruction words to `mem` starting at `base`.
pub fn write_program(mem: &mut memory::Main, base: address, program: &[u32]) {
    let bytes: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
    mem.write_bytes(base, &bytes);
}

#![allow(
    clippy::upper_case_acronyms,
    non_camel_case_types,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

pub mod config;
pub mod core;
pub mod csr;
pub mod decode;
pub mod image;
pub mod instruction;
pub mod memory;
pub mod sim;
pub mod trace;
pub mod warp;

#[cfg(test)]
pub mod testing;

pub use config::Arch;
pub use sim::Driver;

pub type address = u64;

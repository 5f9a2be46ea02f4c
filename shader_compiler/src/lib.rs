//! Compile orchestrator for SH shader containers.
//!
//! Takes shader sources plus compile options, expands every entrypoint into
//! its permutation matrix (shader models x extension sets x uniform sets),
//! compiles the distinct builds against a backend driver and assembles the
//! results into SH files, combining sibling outputs where several inputs
//! target the same file.

pub mod backend;
pub mod orchestrator;
mod pool;

use thiserror::Error;

pub use backend::{
    Backend, CompileError, CompileOutput, CompileSettings, Compiled, EntryReflection,
    IncludeInfo, Parsed, Severity,
};
pub use orchestrator::{compile_shaders, CompileBatch, CompileType, Compiler, WarningFlags};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] shader_format::Error),
    /// Reading a source or writing an output failed. Fatal for the file,
    /// not for the batch.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    /// The backend driver itself failed (not a compile diagnostic).
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Packed compiler version, stored in every produced SH file.
pub const COMPILER_VERSION: u32 = make_version(0, 2, 0);

pub const fn make_version(major: u32, minor: u32, patch: u32) -> u32 {
    major << 22 | minor << 12 | patch
}

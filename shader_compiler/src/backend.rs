//! Contract between the orchestrator and the backend compiler driver.
//!
//! The driver (DXC for DXIL, the SPIR-V toolchain for SPIR-V) is opaque
//! state behind the [`Backend`] trait. One backend instance is owned per
//! worker thread; reflection write-back into the shared entry list goes
//! through the per-file entry lock.

use std::fmt::{self, Display, Formatter};

use parking_lot::Mutex;
use shader_format::binaries::{BinaryIdentifier, ShExtensions};
use shader_format::entries::ShEntryRuntime;
use shader_format::registers::{BinaryType, Registers};
use shader_format::Error as FormatError;

use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Hlsl,
}

#[derive(Clone, Debug)]
pub struct CompileSettings<'a> {
    pub source: &'a str,
    pub path: &'a str,
    pub format: SourceFormat,
    pub output_type: BinaryType,
    /// Extra directory to search for includes.
    pub include_dir: Option<&'a str>,
    pub debug: bool,
    /// Record include provenance in the results.
    pub include_info: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One diagnostic reported by the driver. The orchestrator prints these
/// verbatim and never rewrites them.
#[derive(Clone, Debug)]
pub struct CompileError {
    /// Compile this diagnostic belongs to within a batched driver call.
    pub compile_index: u32,
    pub file: String,
    pub line: u32,
    pub column: u8,
    pub severity: Severity,
    pub message: String,
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(
                f,
                "{}:{}:{}: {}",
                self.file, self.line, self.column, self.message
            )
        }
    }
}

/// Provenance of one file pulled in during preprocessing.
#[derive(Clone, Debug)]
pub struct IncludeInfo {
    pub file: String,
    pub file_size: u32,
    /// CRC32C over the contents with `\r` bytes stripped.
    pub crc32c: u32,
    pub timestamp: u64,
    /// How often the include was hit.
    pub counter: u64,
}

/// Human readable include manifest, one `crc size path` line per include.
pub fn stringify_includes(includes: &[IncludeInfo]) -> String {
    let mut out = String::new();

    for include in includes {
        out.push_str(&format!(
            "{:08x} {:05} {}\n",
            include.crc32c, include.file_size, include.file
        ));
    }

    out
}

/// Payload plus diagnostics of one driver call. `value` is present iff the
/// call succeeded; warnings may be present either way.
#[derive(Debug)]
pub struct CompileOutput<T> {
    pub value: Option<T>,
    pub errors: Vec<CompileError>,
    pub includes: Vec<IncludeInfo>,
}

impl<T> CompileOutput<T> {
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            errors: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<CompileError>) -> Self {
        Self {
            value: None,
            errors,
            includes: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// Result of a parse call: the entry runtimes of the source, or the symbol
/// dump when only symbols were requested.
#[derive(Debug)]
pub enum Parsed {
    Entries(Vec<ShEntryRuntime>),
    Symbols(String),
}

/// Result of compiling one distinct build.
#[derive(Debug)]
pub struct Compiled {
    pub binary: Vec<u8>,
    pub registers: Registers,
    /// Extensions declared by the identifier but not found in the produced
    /// module.
    pub demoted: ShExtensions,
}

/// Result of an optimization + reflection pass over an existing module.
#[derive(Debug)]
pub struct Processed {
    pub registers: Registers,
    pub demoted: ShExtensions,
}

/// Per-file entry list, locked around reflection read-modify-write.
pub type EntryLock = Mutex<Vec<ShEntryRuntime>>;

/// A backend compiler driver. One instance per worker thread.
pub trait Backend: Send {
    fn preprocess(
        &mut self,
        settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<String>, Error>;

    fn parse(
        &mut self,
        settings: &CompileSettings<'_>,
        symbols_only: bool,
    ) -> Result<CompileOutput<Parsed>, Error>;

    /// Compiles one distinct build. Reflection discovered during the
    /// compile is written back into `entries` under the lock, usually via
    /// [`finalize_entrypoint`].
    fn compile(
        &mut self,
        settings: &CompileSettings<'_>,
        identifier: &BinaryIdentifier,
        entries: &EntryLock,
    ) -> Result<CompileOutput<Compiled>, Error>;

    fn disassemble(&mut self, binary: &[u8], binary_type: BinaryType) -> Result<String, Error>;

    /// Optimization and reflection pass over a SPIR-V module; `binary` is
    /// rewritten in place.
    fn process_spirv(
        &mut self,
        binary: &mut Vec<u8>,
        identifier: &BinaryIdentifier,
        entries: &EntryLock,
        settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<Processed>, Error>;

    /// DXIL analog of [`Backend::process_spirv`], optionally fed a
    /// separately produced reflection blob.
    fn process_dxil(
        &mut self,
        binary: &mut Vec<u8>,
        reflection: Option<&[u8]>,
        identifier: &BinaryIdentifier,
        entries: &EntryLock,
        settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<Processed>, Error>;
}

/// Reflection one compile discovered for an entrypoint.
#[derive(Clone, Debug)]
pub struct EntryReflection<'a> {
    pub group: [u16; 3],
    pub payload_size: u8,
    pub intersection_size: u8,
    pub wave_size: u16,
    pub inputs: [u8; 16],
    pub outputs: [u8; 16],
    pub unique_input_semantics: u8,
    pub semantic_names: &'a [String],
    pub input_semantic_names: [u8; 16],
    pub output_semantic_names: [u8; 16],
}

/// Writes compile reflection into the matching entry.
///
/// Callers hold the per-file entry lock. Concurrent permutations of the same
/// entry may land here; the first one fills the entry, every later one must
/// agree with what is already recorded.
pub fn finalize_entrypoint(
    entries: &mut [ShEntryRuntime],
    name: &str,
    reflection: &EntryReflection<'_>,
) -> Result<(), FormatError> {
    let runtime = entries
        .iter_mut()
        .find(|e| e.entry.name == name)
        .ok_or(FormatError::InvariantViolation(
            "reflection for an unknown entrypoint",
        ))?;

    if runtime.is_initialized {
        let entry = &runtime.entry;

        if entry.group != reflection.group
            || entry.payload_size != reflection.payload_size
            || entry.intersection_size != reflection.intersection_size
            || entry.wave_size != reflection.wave_size
            || entry.inputs != reflection.inputs
            || entry.outputs != reflection.outputs
            || entry.unique_input_semantics != reflection.unique_input_semantics
            || entry.semantic_names != reflection.semantic_names
            || entry.input_semantic_names != reflection.input_semantic_names
            || entry.output_semantic_names != reflection.output_semantic_names
        {
            return Err(FormatError::Incompatible(
                "permutations reflect conflicting entrypoint metadata",
            ));
        }

        return Ok(());
    }

    let entry = &mut runtime.entry;
    entry.group = reflection.group;
    entry.payload_size = reflection.payload_size;
    entry.intersection_size = reflection.intersection_size;
    entry.wave_size = reflection.wave_size;
    entry.inputs = reflection.inputs;
    entry.outputs = reflection.outputs;
    entry.unique_input_semantics = reflection.unique_input_semantics;
    entry.semantic_names = reflection.semantic_names.to_vec();
    entry.input_semantic_names = reflection.input_semantic_names;
    entry.output_semantic_names = reflection.output_semantic_names;
    runtime.is_initialized = true;

    Ok(())
}

#[cfg(test)]
mod tests {
    use shader_format::entries::{PipelineStage, ShEntry, ShEntryRuntime};

    use super::{finalize_entrypoint, stringify_includes, EntryReflection, IncludeInfo};

    fn reflection(group: [u16; 3]) -> EntryReflection<'static> {
        EntryReflection {
            group,
            payload_size: 0,
            intersection_size: 0,
            wave_size: 0,
            inputs: [0; 16],
            outputs: [0; 16],
            unique_input_semantics: 0,
            semantic_names: &[],
            input_semantic_names: [0; 16],
            output_semantic_names: [0; 16],
        }
    }

    #[test]
    fn test_finalize_fills_then_verifies() {
        let mut entries = vec![ShEntryRuntime {
            entry: ShEntry::new("main".to_string(), PipelineStage::Compute),
            ..Default::default()
        }];

        finalize_entrypoint(&mut entries, "main", &reflection([8, 8, 1])).unwrap();
        assert!(entries[0].is_initialized);
        assert_eq!(entries[0].entry.group, [8, 8, 1]);

        // Matching repeat is fine, a conflicting one is not.
        finalize_entrypoint(&mut entries, "main", &reflection([8, 8, 1])).unwrap();
        assert!(finalize_entrypoint(&mut entries, "main", &reflection([4, 4, 1])).is_err());
    }

    #[test]
    fn test_finalize_unknown_entry() {
        let mut entries = Vec::new();
        assert!(finalize_entrypoint(&mut entries, "main", &reflection([1, 1, 1])).is_err());
    }

    #[test]
    fn test_stringify_includes() {
        let includes = [IncludeInfo {
            file: "lights.hlsli".to_string(),
            file_size: 321,
            crc32c: 0xAB,
            timestamp: 0,
            counter: 2,
        }];

        assert_eq!(stringify_includes(&includes), "000000ab 00321 lights.hlsli\n");
    }
}

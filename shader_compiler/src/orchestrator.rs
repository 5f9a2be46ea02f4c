//! Batch compile pipeline.
//!
//! Every source file runs preprocess and parse on a worker; the entrypoints
//! found expand into their permutation matrix and deduplicate into distinct
//! builds, which compile in parallel on the same worker pool. Assembly is
//! sequential: per file the distinct builds land in a fresh SH, files
//! targeting the same output path are combined in batch order, and the
//! result goes to disk or into the caller's buffer table.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use bitflags::bitflags;
use hashbrown::HashMap;
use tracing::{error, info, warn};

use shader_format::binaries::BinaryIdentifier;
use shader_format::entries::ShEntryRuntime;
use shader_format::registers::{BinaryType, BufferKind, RegisterKind, UsageFlags};
use shader_format::sb::SB_ROOT;
use shader_format::sh::{ShFile, ShInclude, ShSettingsFlags};

use crate::backend::{
    stringify_includes, Backend, CompileError, CompileOutput, CompileSettings, Compiled,
    IncludeInfo, Parsed, Severity, SourceFormat,
};
use crate::pool::{CompileJob, Scheduler};
use crate::{Error, COMPILER_VERSION};

bitflags! {
    /// Optional post-compile diagnostics.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct WarningFlags: u32 {
        const UNUSED_REGISTERS = 1 << 0;
        const UNUSED_CONSTANTS = 1 << 1;
        const BUFFER_PADDING = 1 << 2;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompileType {
    /// Write the expanded source.
    Preprocess,
    /// Write a human readable include manifest.
    Includes,
    /// Write `.oiSH` containers.
    Compile,
    /// Write a text dump of the parsed symbols.
    Symbols,
}

/// One batch of compiles. `files`, `shader_text`, `outputs` and `modes` are
/// parallel vectors; several entries may share an output path, in which case
/// their SH files are combined in order.
#[derive(Clone, Debug)]
pub struct CompileBatch<'a> {
    pub files: &'a [String],
    pub shader_text: &'a [String],
    pub outputs: &'a [String],
    pub modes: &'a [BinaryType],
    pub thread_count: usize,
    pub debug: bool,
    pub extra_warnings: WarningFlags,
    pub ignore_empty_files: bool,
    pub compile_type: CompileType,
    pub include_dir: Option<&'a str>,
    pub output_dir: Option<&'a str>,
    pub enable_logging: bool,
}

/// Per-thread handle over a backend driver. Forwards the driver calls and
/// prints their diagnostics.
pub struct Compiler<B> {
    backend: B,
    enable_logging: bool,
}

impl<B> Compiler<B>
where
    B: Backend,
{
    pub fn new(backend: B, enable_logging: bool) -> Self {
        Self {
            backend,
            enable_logging,
        }
    }

    fn log_diagnostics(&self, errors: &[CompileError]) {
        if !self.enable_logging {
            return;
        }

        for err in errors {
            match err.severity {
                Severity::Warning => warn!("{}", err),
                Severity::Error => error!("{}", err),
            }
        }
    }

    pub fn preprocess(
        &mut self,
        settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<String>, Error> {
        let output = self.backend.preprocess(settings)?;
        self.log_diagnostics(&output.errors);
        Ok(output)
    }

    pub fn parse(
        &mut self,
        settings: &CompileSettings<'_>,
        symbols_only: bool,
    ) -> Result<CompileOutput<Parsed>, Error> {
        let output = self.backend.parse(settings, symbols_only)?;
        self.log_diagnostics(&output.errors);
        Ok(output)
    }

    pub fn compile(
        &mut self,
        settings: &CompileSettings<'_>,
        identifier: &BinaryIdentifier,
        entries: &crate::backend::EntryLock,
    ) -> Result<CompileOutput<Compiled>, Error> {
        let output = self.backend.compile(settings, identifier, entries)?;
        self.log_diagnostics(&output.errors);
        Ok(output)
    }

    pub fn disassemble(
        &mut self,
        binary: &[u8],
        binary_type: BinaryType,
    ) -> Result<String, Error> {
        self.backend.disassemble(binary, binary_type)
    }
}

#[derive(Default)]
struct FileState {
    entries: crate::backend::EntryLock,
    outcome: OnceLock<ParseOutcome>,
    base_slot: OnceLock<usize>,
    failed: AtomicBool,
}

struct ParseOutcome {
    source_crc: u32,
    preprocessed: String,
    text_output: Option<String>,
    include_info: Vec<IncludeInfo>,
    /// Distinct builds as `(entry id, combination id)`.
    builds: Vec<(u16, u16)>,
    /// Per entry-combination, in traversal order, the distinct build it
    /// resolved to. Becomes `ShEntry::binary_ids`.
    binary_indices: Vec<u16>,
}

/// Compiles a batch of shader sources. Returns whether every file
/// succeeded; per-file failures are reported through `tracing` and never
/// abort the rest of the batch.
pub fn compile_shaders<B, F>(
    batch: &CompileBatch<'_>,
    make_backend: F,
    mut buffers: Option<&mut Vec<Option<Vec<u8>>>>,
) -> bool
where
    B: Backend,
    F: Fn() -> B + Sync,
{
    let count = batch.files.len();

    if batch.shader_text.len() != count
        || batch.outputs.len() != count
        || batch.modes.len() != count
    {
        error!("compile batch vectors have mismatching lengths");
        return false;
    }

    if let Some(buffers) = buffers.as_deref_mut() {
        buffers.clear();
        buffers.resize(count, None);
    }

    let files: Vec<FileState> = (0..count).map(|_| FileState::default()).collect();
    let scheduler = Scheduler::<CompileOutput<Compiled>>::new(count);

    let run_worker = || {
        let mut compiler = Compiler::new(make_backend(), batch.enable_logging);

        while let Some(file) = scheduler.next_parse() {
            let state = &files[file];

            match parse_file(batch, file, &mut compiler, state) {
                Ok(builds) => {
                    let base = scheduler.finish_parse(file, builds.into_iter());
                    state.base_slot.set(base).ok();
                }
                Err(err) => {
                    if batch.enable_logging {
                        error!("precompile failed for file \"{}\": {}", batch.files[file], err);
                    }

                    state.failed.store(true, Ordering::Relaxed);
                    scheduler.finish_parse(file, std::iter::empty());
                }
            }
        }

        while let Some(job) = scheduler.next_compile() {
            let state = &files[job.file];

            match compile_build(batch, &job, &mut compiler, state) {
                Ok(output) => {
                    if !output.is_success() {
                        state.failed.store(true, Ordering::Relaxed);
                    }

                    scheduler.store_result(job.slot, output);
                }
                Err(err) => {
                    if batch.enable_logging {
                        error!(
                            "compile failed for file \"{}\": {}",
                            batch.files[job.file], err
                        );
                    }

                    state.failed.store(true, Ordering::Relaxed);
                    scheduler.store_result(job.slot, CompileOutput::failure(Vec::new()));
                }
            }
        }
    };

    let threads = batch.thread_count.clamp(1, count.max(1));

    if threads <= 1 {
        run_worker();
    } else {
        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(&run_worker);
            }
        });
    }

    drop(run_worker);
    let mut results = scheduler.into_results();

    match batch.compile_type {
        CompileType::Compile => assemble_outputs(batch, &files, &mut results, buffers),
        _ => write_text_outputs(batch, &files, buffers),
    }
}

fn parse_file<B>(
    batch: &CompileBatch<'_>,
    file: usize,
    compiler: &mut Compiler<B>,
    state: &FileState,
) -> Result<Vec<(u16, u16)>, Error>
where
    B: Backend,
{
    let path = &batch.files[file];

    let settings = CompileSettings {
        source: &batch.shader_text[file],
        path,
        format: SourceFormat::Hlsl,
        output_type: batch.modes[file],
        include_dir: batch.include_dir,
        debug: batch.debug,
        include_info: matches!(
            batch.compile_type,
            CompileType::Includes | CompileType::Compile
        ),
    };

    let preprocess = compiler.preprocess(&settings)?;
    let mut include_info = preprocess.includes;

    let Some(mut preprocessed) = preprocess.value else {
        return Err(Error::Backend("preprocess reported errors".to_string()));
    };

    let source_crc = crc32c::crc32c(preprocessed.as_bytes());

    let mut text_output = None;
    let mut builds = Vec::new();
    let mut binary_indices = Vec::new();

    match batch.compile_type {
        CompileType::Preprocess => {
            text_output = Some(std::mem::take(&mut preprocessed));
        }
        CompileType::Includes => {
            let mut manifest = stringify_includes(&include_info);
            manifest.push_str(&format!(
                "\nSources:\n{:08x} {:05} {}\n",
                crc32c::crc32c(batch.shader_text[file].as_bytes()),
                batch.shader_text[file].len(),
                path,
            ));
            text_output = Some(manifest);
        }
        CompileType::Symbols => {
            let parse_settings = CompileSettings {
                source: &preprocessed,
                ..settings
            };

            let parsed = compiler.parse(&parse_settings, true)?;

            match parsed.value {
                Some(Parsed::Symbols(symbols)) => text_output = Some(symbols),
                _ => return Err(Error::Backend("parse reported errors".to_string())),
            }
        }
        CompileType::Compile => {
            let parse_settings = CompileSettings {
                source: &preprocessed,
                ..settings
            };

            let parsed = compiler.parse(&parse_settings, false)?;
            include_info.extend(parsed.includes);

            let Some(Parsed::Entries(entries)) = parsed.value else {
                return Err(Error::Backend("parse reported errors".to_string()));
            };

            if entries.is_empty() {
                if !batch.ignore_empty_files {
                    return Err(Error::Backend("no entrypoints found".to_string()));
                }
            } else {
                (builds, binary_indices) = unique_compiles(&entries)?;
                *state.entries.lock() = entries;
            }
        }
    }

    state
        .outcome
        .set(ParseOutcome {
            source_crc,
            preprocessed,
            text_output,
            include_info,
            builds: builds.clone(),
            binary_indices,
        })
        .ok();

    Ok(builds)
}

/// Collapses the entry x combination matrix of a file into its distinct
/// binary identifiers. Returns the distinct builds plus, per entry
/// combination in traversal order, the build each one resolved to.
fn unique_compiles(
    entries: &[ShEntryRuntime],
) -> Result<(Vec<(u16, u16)>, Vec<u16>), shader_format::Error> {
    let mut seen: HashMap<BinaryIdentifier, u16> = HashMap::new();
    let mut builds = Vec::new();
    let mut indices = Vec::new();

    for (entry, runtime) in entries.iter().enumerate() {
        if entry >= u16::MAX as usize {
            return Err(shader_format::Error::CapacityExceeded(
                "entry table is limited to 16 bit",
            ));
        }

        for combination in 0..runtime.combination_count() {
            if combination >= u16::MAX as u32 {
                return Err(shader_format::Error::CapacityExceeded(
                    "combination matrix is limited to 16 bit",
                ));
            }

            let identifier = runtime.as_binary_identifier(combination as u16)?;

            let next = seen.len() as u16;
            let slot = *seen.entry(identifier).or_insert_with(|| {
                builds.push((entry as u16, combination as u16));
                next
            });

            indices.push(slot);
        }
    }

    Ok((builds, indices))
}

fn compile_build<B>(
    batch: &CompileBatch<'_>,
    job: &CompileJob,
    compiler: &mut Compiler<B>,
    state: &FileState,
) -> Result<CompileOutput<Compiled>, Error>
where
    B: Backend,
{
    let outcome = state
        .outcome
        .get()
        .expect("compile jobs only exist for parsed files");

    let identifier = {
        let entries = state.entries.lock();
        entries[job.entry as usize].as_binary_identifier(job.combination)?
    };

    let settings = CompileSettings {
        source: &outcome.preprocessed,
        path: &batch.files[job.file],
        format: SourceFormat::Hlsl,
        output_type: batch.modes[job.file],
        include_dir: batch.include_dir,
        debug: batch.debug,
        include_info: true,
    };

    let output = compiler.compile(&settings, &identifier, &state.entries)?;

    if batch.enable_logging {
        let mode = batch.modes[job.file].name();

        if output.is_success() {
            info!(
                "compile success: {} ({}, {}:{})",
                batch.files[job.file], mode, job.entry, job.combination
            );
        } else {
            error!(
                "compile failed: {} ({}, {}:{})",
                batch.files[job.file], mode, job.entry, job.combination
            );
        }
    }

    Ok(output)
}

enum FileSh {
    Built(ShFile),
    Failed,
    /// The file produced no entrypoints and empty files are ignored.
    Skip,
}

fn build_file_sh(
    batch: &CompileBatch<'_>,
    file: usize,
    state: &FileState,
    results: &mut [Option<CompileOutput<Compiled>>],
) -> FileSh {
    if state.failed.load(Ordering::Relaxed) {
        return FileSh::Failed;
    }

    let Some(outcome) = state.outcome.get() else {
        return FileSh::Failed;
    };

    if outcome.builds.is_empty() {
        return FileSh::Skip;
    }

    let base = *state
        .base_slot
        .get()
        .expect("parsed files were assigned a result slot");

    let mut sh = ShFile::new(ShSettingsFlags::empty(), COMPILER_VERSION, outcome.source_crc);

    for include in &outcome.include_info {
        if let Err(err) = add_include(&mut sh, &batch.files[file], include) {
            error!("{}: {}", batch.files[file], err);
            return FileSh::Failed;
        }
    }

    for (build, (entry, combination)) in outcome.builds.iter().enumerate() {
        let Some(result) = results.get_mut(base + build).and_then(Option::take) else {
            return FileSh::Failed;
        };

        let Some(compiled) = result.value else {
            return FileSh::Failed;
        };

        for include in &result.includes {
            if let Err(err) = add_include(&mut sh, &batch.files[file], include) {
                error!("{}: {}", batch.files[file], err);
                return FileSh::Failed;
            }
        }

        let info = {
            let entries = state.entries.lock();
            entries[*entry as usize].as_binary_info(
                *combination,
                batch.modes[file],
                compiled.binary,
                compiled.demoted,
            )
        };

        match info {
            Ok(mut info) => {
                info.registers = compiled.registers;

                if let Err(err) = sh.add_binary(info) {
                    error!("{}: {}", batch.files[file], err);
                    return FileSh::Failed;
                }
            }
            Err(err) => {
                error!("{}: {}", batch.files[file], err);
                return FileSh::Failed;
            }
        }
    }

    let entries = std::mem::take(&mut *state.entries.lock());
    let mut cursor = 0;

    for runtime in entries {
        let combinations = runtime.combination_count() as usize;
        let ids = &outcome.binary_indices[cursor..cursor + combinations];
        cursor += combinations;

        let mut entry = runtime.entry;
        entry.binary_ids = Vec::with_capacity(ids.len());

        for id in ids {
            if !entry.binary_ids.contains(id) {
                entry.binary_ids.push(*id);
            }
        }

        if let Err(err) = sh.add_entrypoint(entry) {
            error!("{}: {}", batch.files[file], err);
            return FileSh::Failed;
        }
    }

    FileSh::Built(sh)
}

fn assemble_outputs(
    batch: &CompileBatch<'_>,
    files: &[FileState],
    results: &mut [Option<CompileOutput<Compiled>>],
    mut buffers: Option<&mut Vec<Option<Vec<u8>>>>,
) -> bool {
    let mut success = true;
    let mut group_failed = false;
    let mut group_sh: Option<ShFile> = None;

    for file in 0..batch.files.len() {
        if file == 0 || batch.outputs[file] != batch.outputs[file - 1] {
            group_failed = false;
            group_sh = None;
        }

        match build_file_sh(batch, file, &files[file], results) {
            FileSh::Skip => {}
            FileSh::Failed => {
                group_failed = true;
                success = false;
            }
            FileSh::Built(sh) => {
                // Once a sibling failed the whole output is dropped; later
                // files of the group still compiled, they just go nowhere.
                if !group_failed {
                    group_sh = match group_sh.take() {
                        None => Some(sh),
                        Some(previous) => match ShFile::combine(&previous, &sh) {
                            Ok(combined) => Some(combined),
                            Err(err) => {
                                error!("failed to combine {}: {}", batch.outputs[file], err);
                                group_failed = true;
                                success = false;
                                None
                            }
                        },
                    };
                }
            }
        }

        let group_ends =
            file + 1 == batch.files.len() || batch.outputs[file + 1] != batch.outputs[file];

        if !group_ends {
            continue;
        }

        if group_failed {
            if batch.enable_logging {
                warn!(
                    "a sibling compilation failed, not producing \"{}\"",
                    batch.outputs[file]
                );
            }

            continue;
        }

        let Some(sh) = group_sh.take() else {
            continue;
        };

        if !batch.extra_warnings.is_empty() {
            emit_extra_warnings(&sh, batch.extra_warnings, &batch.outputs[file]);
        }

        match sh.write() {
            Ok(bytes) => {
                if !store_output(batch, file, bytes, &mut buffers) {
                    success = false;
                }
            }
            Err(err) => {
                error!("failed to serialize {}: {}", batch.outputs[file], err);
                success = false;
            }
        }
    }

    success
}

fn write_text_outputs(
    batch: &CompileBatch<'_>,
    files: &[FileState],
    mut buffers: Option<&mut Vec<Option<Vec<u8>>>>,
) -> bool {
    let mut success = true;

    for file in 0..batch.files.len() {
        if files[file].failed.load(Ordering::Relaxed) {
            success = false;
            continue;
        }

        let Some(outcome) = files[file].outcome.get() else {
            success = false;
            continue;
        };

        let Some(text) = &outcome.text_output else {
            continue;
        };

        if !store_output(batch, file, text.clone().into_bytes(), &mut buffers) {
            success = false;
        }
    }

    // A merged manifest over the whole batch next to the per-file ones.
    if batch.compile_type == CompileType::Includes && buffers.is_none() {
        if let Some(dir) = batch.output_dir {
            success &= write_include_root(batch, files, dir);
        }
    }

    success
}

fn write_include_root(batch: &CompileBatch<'_>, files: &[FileState], dir: &str) -> bool {
    let mut merged: HashMap<&str, IncludeInfo> = HashMap::new();

    for state in files {
        let Some(outcome) = state.outcome.get() else {
            continue;
        };

        for include in &outcome.include_info {
            merged
                .entry(include.file.as_str())
                .and_modify(|m| m.counter += include.counter)
                .or_insert_with(|| include.clone());
        }
    }

    let mut includes: Vec<IncludeInfo> = merged.into_values().collect();
    includes.sort_by(|a, b| a.file.cmp(&b.file));

    let mut manifest = stringify_includes(&includes);
    manifest.push_str("\nSources:\n");

    for file in 0..batch.files.len() {
        if file != 0 && batch.files[file] == batch.files[file - 1] {
            continue;
        }

        manifest.push_str(&format!(
            "{:08x} {:05} {}\n",
            crc32c::crc32c(batch.shader_text[file].as_bytes()),
            batch.shader_text[file].len(),
            batch.files[file],
        ));
    }

    let path = Path::new(dir).join("root.txt");

    match fs::write(&path, manifest) {
        Ok(()) => true,
        Err(err) => {
            error!("failed to write {}: {}", path.display(), err);
            false
        }
    }
}

fn store_output(
    batch: &CompileBatch<'_>,
    file: usize,
    bytes: Vec<u8>,
    buffers: &mut Option<&mut Vec<Option<Vec<u8>>>>,
) -> bool {
    match buffers {
        Some(buffers) => {
            buffers[file] = Some(bytes);
            true
        }
        None => {
            let path = Path::new(&batch.outputs[file]);

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).ok();
            }

            match fs::write(path, bytes) {
                Ok(()) => true,
                Err(err) => {
                    error!("failed to write {}: {}", path.display(), err);
                    false
                }
            }
        }
    }
}

fn add_include(
    sh: &mut ShFile,
    source_path: &str,
    include: &IncludeInfo,
) -> Result<(), shader_format::Error> {
    sh.add_include(ShInclude {
        relative_path: relative_include_path(source_path, &include.file),
        crc32c: include.crc32c,
    })
}

/// Include paths are recorded relative to the source file's directory so
/// the output is reproducible across machines.
fn relative_include_path(source_path: &str, include: &str) -> String {
    let parent = Path::new(source_path).parent().unwrap_or(Path::new(""));

    if parent.as_os_str().is_empty() {
        return include.to_string();
    }

    match Path::new(include).strip_prefix(parent) {
        Ok(stripped) => stripped.to_string_lossy().into_owned(),
        Err(_) => include.to_string(),
    }
}

fn emit_extra_warnings(sh: &ShFile, warnings: WarningFlags, output: &str) {
    for binary in &sh.binaries {
        let owner = binary.identifier.entrypoint.as_deref().unwrap_or("<lib>");

        for reg in &binary.registers {
            if warnings.contains(WarningFlags::UNUSED_REGISTERS) {
                for ty in BinaryType::ALL {
                    if binary.has_blob(ty)
                        && reg.register.bindings.get(ty).is_set()
                        && !reg.register.used.contains(UsageFlags::of(ty))
                    {
                        warn!(
                            "{}: register {} of {} is never used ({})",
                            output,
                            reg.name,
                            owner,
                            ty.name()
                        );
                    }
                }
            }

            let Some(sb) = &reg.shader_buffer else {
                continue;
            };

            if warnings.contains(WarningFlags::UNUSED_CONSTANTS) {
                for (var, name) in sb.vars.iter().zip(&sb.var_names) {
                    if var.flags.is_empty() {
                        warn!(
                            "{}: constant {} in buffer {} is never used",
                            output, name, reg.name
                        );
                    }
                }
            }

            if warnings.contains(WarningFlags::BUFFER_PADDING)
                && matches!(
                    reg.register.kind,
                    RegisterKind::Buffer {
                        kind: BufferKind::Constant,
                        ..
                    }
                )
            {
                let end = sb
                    .vars
                    .iter()
                    .enumerate()
                    .filter(|(_, var)| var.parent_id == SB_ROOT)
                    .map(|(id, var)| var.offset + sb.var_size(id as u16))
                    .max()
                    .unwrap_or(0);

                if end < sb.buffer_size {
                    warn!(
                        "{}: buffer {} carries {} trailing padding bytes",
                        output,
                        reg.name,
                        sb.buffer_size - end
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use shader_format::binaries::{shader_model, ShExtensions};
    use shader_format::entries::{PipelineStage, ShEntry, ShEntryRuntime};

    use super::{relative_include_path, unique_compiles};

    fn runtime(name: &str, stage: PipelineStage) -> ShEntryRuntime {
        ShEntryRuntime {
            entry: ShEntry::new(name.to_string(), stage),
            vendor_mask: u16::MAX,
            ..Default::default()
        }
    }

    #[test]
    fn test_unique_compiles_dedups_raytracing() {
        // All raytracing stages collapse to one library identifier per
        // permutation.
        let entries = vec![
            ShEntryRuntime {
                is_shader_annotation: true,
                ..runtime("raygen", PipelineStage::Raygen)
            },
            ShEntryRuntime {
                is_shader_annotation: true,
                ..runtime("miss", PipelineStage::Miss)
            },
            ShEntryRuntime {
                is_shader_annotation: true,
                ..runtime("hit", PipelineStage::ClosestHit)
            },
        ];

        let (builds, indices) = unique_compiles(&entries).unwrap();
        assert_eq!(builds, vec![(0, 0)]);
        assert_eq!(indices, vec![0, 0, 0]);
    }

    #[test]
    fn test_unique_compiles_expands_matrix() {
        let mut a = runtime("main", PipelineStage::Compute);
        a.shader_versions = vec![shader_model(6, 5), shader_model(6, 6)];
        a.extensions = vec![ShExtensions::empty(), ShExtensions::F64];

        let mut b = runtime("other", PipelineStage::Compute);
        b.shader_versions = vec![shader_model(6, 5)];

        let (builds, indices) = unique_compiles(&[a, b]).unwrap();

        // Distinct entrypoint names never dedup; 4 + 1 builds.
        assert_eq!(builds.len(), 5);
        assert_eq!(indices.len(), 5);
        assert_eq!(indices[4], 4);
    }

    #[test]
    fn test_unique_compiles_dedups_equal_sets() {
        // Two identical extension sets collapse onto one build.
        let mut entry = runtime("main", PipelineStage::Compute);
        entry.extensions = vec![ShExtensions::F64, ShExtensions::F64];

        let (builds, indices) = unique_compiles(&[entry]).unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(indices, vec![0, 0]);
    }

    #[test]
    fn test_relative_include_path() {
        assert_eq!(
            relative_include_path("shaders/main.hlsl", "shaders/lights.hlsli"),
            "lights.hlsli"
        );
        assert_eq!(
            relative_include_path("shaders/main.hlsl", "common/brdf.hlsli"),
            "common/brdf.hlsli"
        );
        assert_eq!(
            relative_include_path("main.hlsl", "lights.hlsli"),
            "lights.hlsli"
        );
    }
}

//! End-to-end orchestrator tests against a scripted mock driver.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use shader_compiler::backend::{
    finalize_entrypoint, Backend, CompileError, CompileOutput, CompileSettings, Compiled,
    EntryLock, EntryReflection, IncludeInfo, Parsed, Processed, Severity,
};
use shader_compiler::orchestrator::{
    compile_shaders, CompileBatch, CompileType, WarningFlags,
};
use shader_compiler::{Error, COMPILER_VERSION};
use shader_format::binaries::{shader_model, BinaryIdentifier, ShExtensions};
use shader_format::entries::{PipelineStage, ShEntry, ShEntryRuntime};
use shader_format::registers::{
    BinaryType, BufferKind, Registers, ShBinding, ShBindings, TextureType, UsageFlags,
};
use shader_format::sb::{SbFile, SbFlags, SbType, SbVarFlags, SbVarKind, SB_ROOT};
use shader_format::sh::{DeviceCapabilities, ShFile};

#[derive(Clone, Default)]
struct OwnedReflection {
    group: [u16; 3],
    payload_size: u8,
    intersection_size: u8,
    wave_size: u16,
    inputs: [u8; 16],
    outputs: [u8; 16],
    unique_input_semantics: u8,
    semantic_names: Vec<String>,
    input_semantic_names: [u8; 16],
    output_semantic_names: [u8; 16],
}

impl OwnedReflection {
    fn compute(group: [u16; 3]) -> Self {
        Self {
            group,
            ..Default::default()
        }
    }

    fn borrow(&self) -> EntryReflection<'_> {
        EntryReflection {
            group: self.group,
            payload_size: self.payload_size,
            intersection_size: self.intersection_size,
            wave_size: self.wave_size,
            inputs: self.inputs,
            outputs: self.outputs,
            unique_input_semantics: self.unique_input_semantics,
            semantic_names: &self.semantic_names,
            input_semantic_names: self.input_semantic_names,
            output_semantic_names: self.output_semantic_names,
        }
    }
}

type RegisterScript = Box<dyn Fn(&BinaryIdentifier) -> Registers + Send + Sync>;

#[derive(Default)]
struct MockWorld {
    /// Entry runtimes the "parser" finds, per source path.
    entries: HashMap<String, Vec<ShEntryRuntime>>,
    /// Reflection the "compiler" writes back, per entry name.
    reflections: HashMap<String, OwnedReflection>,
    /// Registers reflected out of a compiled module.
    registers: Option<RegisterScript>,
    /// Includes reported per source path.
    includes: HashMap<String, Vec<IncludeInfo>>,
    fail_compile: HashSet<String>,
}

struct MockBackend {
    world: Arc<MockWorld>,
}

impl MockBackend {
    fn apply_reflection(
        &self,
        entries: &mut [ShEntryRuntime],
        name: &str,
    ) -> Result<(), Error> {
        let Some(reflection) = self.world.reflections.get(name) else {
            return Ok(());
        };

        finalize_entrypoint(entries, name, &reflection.borrow())?;
        Ok(())
    }
}

impl Backend for MockBackend {
    fn preprocess(
        &mut self,
        settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<String>, Error> {
        let mut output = CompileOutput::success(format!("// expanded\n{}", settings.source));

        if settings.include_info {
            output.includes = self
                .world
                .includes
                .get(settings.path)
                .cloned()
                .unwrap_or_default();
        }

        Ok(output)
    }

    fn parse(
        &mut self,
        settings: &CompileSettings<'_>,
        symbols_only: bool,
    ) -> Result<CompileOutput<Parsed>, Error> {
        if symbols_only {
            return Ok(CompileOutput::success(Parsed::Symbols(format!(
                "symbols of {}",
                settings.path
            ))));
        }

        let entries = self
            .world
            .entries
            .get(settings.path)
            .cloned()
            .unwrap_or_default();

        Ok(CompileOutput::success(Parsed::Entries(entries)))
    }

    fn compile(
        &mut self,
        settings: &CompileSettings<'_>,
        identifier: &BinaryIdentifier,
        entries: &EntryLock,
    ) -> Result<CompileOutput<Compiled>, Error> {
        if self.world.fail_compile.contains(settings.path) {
            return Ok(CompileOutput::failure(vec![CompileError {
                compile_index: 0,
                file: settings.path.to_string(),
                line: 4,
                column: 2,
                severity: Severity::Error,
                message: "mock compile error".to_string(),
            }]));
        }

        {
            let mut guard = entries.lock();

            match &identifier.entrypoint {
                Some(name) => self.apply_reflection(&mut guard, name)?,
                // Library builds cover every entry of the file.
                None => {
                    let names: Vec<String> =
                        guard.iter().map(|e| e.entry.name.clone()).collect();

                    for name in names {
                        self.apply_reflection(&mut guard, &name)?;
                    }
                }
            }
        }

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        identifier.hash(&mut hasher);
        (settings.output_type as u8).hash(&mut hasher);
        let word = hasher.finish();

        let mut binary = Vec::with_capacity(16);
        binary.extend_from_slice(&word.to_le_bytes());
        binary.extend_from_slice(&(!word).to_le_bytes());

        let registers = self
            .world
            .registers
            .as_ref()
            .map(|f| f(identifier))
            .unwrap_or_default();

        let mut output = CompileOutput::success(Compiled {
            binary,
            registers,
            demoted: ShExtensions::empty(),
        });
        output.includes = self
            .world
            .includes
            .get(settings.path)
            .cloned()
            .unwrap_or_default();

        Ok(output)
    }

    fn disassemble(&mut self, binary: &[u8], binary_type: BinaryType) -> Result<String, Error> {
        Ok(format!("; {} module, {} bytes", binary_type.name(), binary.len()))
    }

    fn process_spirv(
        &mut self,
        _binary: &mut Vec<u8>,
        _identifier: &BinaryIdentifier,
        _entries: &EntryLock,
        _settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<Processed>, Error> {
        Ok(CompileOutput::success(Processed {
            registers: Registers::new(),
            demoted: ShExtensions::empty(),
        }))
    }

    fn process_dxil(
        &mut self,
        _binary: &mut Vec<u8>,
        _reflection: Option<&[u8]>,
        _identifier: &BinaryIdentifier,
        _entries: &EntryLock,
        _settings: &CompileSettings<'_>,
    ) -> Result<CompileOutput<Processed>, Error> {
        Ok(CompileOutput::success(Processed {
            registers: Registers::new(),
            demoted: ShExtensions::empty(),
        }))
    }
}

fn runtime(name: &str, stage: PipelineStage) -> ShEntryRuntime {
    ShEntryRuntime {
        entry: ShEntry::new(name.to_string(), stage),
        vendor_mask: u16::MAX,
        ..Default::default()
    }
}

fn spirv_bindings(space: u32, binding: u32) -> ShBindings {
    let mut bindings = ShBindings::NONE;
    bindings.set(BinaryType::Spirv, ShBinding { space, binding });
    bindings
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn run(
    world: MockWorld,
    files: &[&str],
    outputs: &[&str],
    modes: &[BinaryType],
    compile_type: CompileType,
    thread_count: usize,
) -> (bool, Vec<Option<Vec<u8>>>) {
    let world = Arc::new(world);
    let files = strings(files);
    let shader_text: Vec<String> = files.iter().map(|f| format!("source of {f}")).collect();
    let outputs = strings(outputs);

    let batch = CompileBatch {
        files: &files,
        shader_text: &shader_text,
        outputs: &outputs,
        modes,
        thread_count,
        debug: false,
        extra_warnings: WarningFlags::empty(),
        ignore_empty_files: false,
        compile_type,
        include_dir: None,
        output_dir: None,
        enable_logging: false,
    };

    let mut buffers = Vec::new();
    let success = compile_shaders(
        &batch,
        || MockBackend {
            world: world.clone(),
        },
        Some(&mut buffers),
    );

    (success, buffers)
}

#[test]
fn test_empty_compute_shader() {
    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/basic.hlsl".to_string(),
        vec![runtime("main", PipelineStage::Compute)],
    );
    world
        .reflections
        .insert("main".to_string(), OwnedReflection::compute([8, 8, 1]));

    let (success, buffers) = run(
        world,
        &["shaders/basic.hlsl"],
        &["out/basic.spv.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        1,
    );

    assert!(success);
    let bytes = buffers[0].as_ref().unwrap();

    let sh = ShFile::read(bytes, false).unwrap();
    assert_eq!(sh.compiler_version, COMPILER_VERSION);
    assert_eq!(sh.binaries.len(), 1);
    assert_eq!(sh.entries.len(), 1);
    assert_eq!(sh.entries[0].binary_ids, vec![0]);
    assert_eq!(sh.entries[0].group, [8, 8, 1]);
    assert_eq!(sh.binaries[0].identifier.stage, PipelineStage::Compute);
    assert_eq!(sh.binaries[0].identifier.shader_version, shader_model(6, 5));
    assert!(sh.binaries[0].registers.is_empty());
    assert!(sh.binaries[0].has_blob(BinaryType::Spirv));
}

#[test]
fn test_shared_binding_across_stages() {
    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/mesh.hlsl".to_string(),
        vec![
            runtime("vs_main", PipelineStage::Vertex),
            runtime("ps_main", PipelineStage::Pixel),
        ],
    );

    let mut vs = OwnedReflection::default();
    vs.inputs[0] = SbType::F32X4.0;
    vs.outputs[0] = SbType::F32X4.0;
    world.reflections.insert("vs_main".to_string(), vs);

    let mut ps = OwnedReflection::default();
    ps.inputs[0] = SbType::F32X4.0;
    ps.outputs[0] = SbType::F32X4.0;
    world.reflections.insert("ps_main".to_string(), ps);

    world.registers = Some(Box::new(|_| {
        let mut layout = SbFile::new(SbFlags::empty(), 256).unwrap();
        layout
            .add_variable(
                "view",
                0,
                SB_ROOT,
                SbVarKind::Primitive(SbType::F32X4X4),
                SbVarFlags::USED_SPIRV,
                None,
            )
            .unwrap();

        let mut registers = Registers::new();
        registers
            .add_buffer(
                BufferKind::Constant,
                false,
                UsageFlags::SPIRV,
                "globals".to_string(),
                None,
                Some(layout),
                spirv_bindings(0, 0),
            )
            .unwrap();
        registers
    }));

    let (success, buffers) = run(
        world,
        &["shaders/mesh.hlsl"],
        &["out/mesh.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        1,
    );

    assert!(success);
    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();

    assert_eq!(sh.binaries.len(), 2);
    assert_eq!(sh.entries.len(), 2);

    for binary in &sh.binaries {
        assert_eq!(binary.registers.len(), 1);
        assert_eq!(binary.registers[0].name, "globals");
        assert_eq!(
            binary.registers[0].register.bindings.get(BinaryType::Spirv),
            ShBinding {
                space: 0,
                binding: 0
            }
        );
    }
}

#[test]
fn test_bindless_detection_end_to_end() {
    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/many.hlsl".to_string(),
        vec![runtime("main", PipelineStage::Compute)],
    );
    world
        .reflections
        .insert("main".to_string(), OwnedReflection::compute([64, 1, 1]));

    world.registers = Some(Box::new(|_| {
        let mut registers = Registers::new();

        for i in 0..17u32 {
            registers
                .add_texture(
                    TextureType::D2,
                    false,
                    false,
                    UsageFlags::SPIRV,
                    None,
                    format!("tex{i}"),
                    None,
                    spirv_bindings(0, i),
                )
                .unwrap();
        }

        registers
    }));

    let (success, buffers) = run(
        world,
        &["shaders/many.hlsl"],
        &["out/many.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        1,
    );

    assert!(success);
    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();

    let extensions = sh.binaries[0].identifier.extensions;
    assert!(extensions.contains(ShExtensions::BINDLESS));
    assert!(!extensions.contains(ShExtensions::UNBOUND_ARRAY_SIZE));
}

#[test]
fn test_combine_two_modes_into_one_output() {
    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/basic.hlsl".to_string(),
        vec![runtime("main", PipelineStage::Compute)],
    );
    world
        .reflections
        .insert("main".to_string(), OwnedReflection::compute([8, 8, 1]));

    world.registers = Some(Box::new(|_| {
        let mut registers = Registers::new();
        registers
            .add_sampler(
                UsageFlags::SPIRV | UsageFlags::DXIL,
                false,
                "linear".to_string(),
                None,
                {
                    let mut bindings = spirv_bindings(0, 0);
                    bindings.set(
                        BinaryType::Dxil,
                        ShBinding {
                            space: 0,
                            binding: 0,
                        },
                    );
                    bindings
                },
            )
            .unwrap();
        registers
    }));

    let (success, buffers) = run(
        world,
        &["shaders/basic.hlsl", "shaders/basic.hlsl"],
        &["out/basic.oiSH", "out/basic.oiSH"],
        &[BinaryType::Spirv, BinaryType::Dxil],
        CompileType::Compile,
        2,
    );

    assert!(success);
    // The combined output lands on the last member of the group.
    assert!(buffers[0].is_none());
    let sh = ShFile::read(buffers[1].as_ref().unwrap(), false).unwrap();

    assert_eq!(sh.binaries.len(), 1);
    assert!(sh.binaries[0].has_blob(BinaryType::Spirv));
    assert!(sh.binaries[0].has_blob(BinaryType::Dxil));
    assert_eq!(sh.entries.len(), 1);
    assert_eq!(sh.entries[0].binary_ids, vec![0]);
    assert_eq!(sh.binaries[0].registers.len(), 1);
}

#[test]
fn test_failure_isolated_per_file() {
    let mut world = MockWorld::default();

    for path in ["shaders/good.hlsl", "shaders/bad.hlsl"] {
        world.entries.insert(
            path.to_string(),
            vec![runtime(
                if path.contains("good") { "good_main" } else { "bad_main" },
                PipelineStage::Compute,
            )],
        );
    }
    world
        .reflections
        .insert("good_main".to_string(), OwnedReflection::compute([8, 8, 1]));
    world
        .reflections
        .insert("bad_main".to_string(), OwnedReflection::compute([8, 8, 1]));
    world.fail_compile.insert("shaders/bad.hlsl".to_string());

    let (success, buffers) = run(
        world,
        &["shaders/good.hlsl", "shaders/bad.hlsl"],
        &["out/good.oiSH", "out/bad.oiSH"],
        &[BinaryType::Spirv, BinaryType::Spirv],
        CompileType::Compile,
        2,
    );

    assert!(!success);
    assert!(buffers[0].is_some());
    assert!(buffers[1].is_none());

    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();
    assert_eq!(sh.entries[0].name, "good_main");
}

#[test]
fn test_permutation_matrix_expansion() {
    let mut entry = runtime("main", PipelineStage::Compute);
    entry.shader_versions = vec![shader_model(6, 5), shader_model(6, 6)];
    entry.uniform_name_values = vec![
        ("QUALITY".to_string(), "1".to_string()),
        ("QUALITY".to_string(), "2".to_string()),
    ];
    entry.uniforms_per_compilation = vec![1, 1];

    let mut world = MockWorld::default();
    world
        .entries
        .insert("shaders/quality.hlsl".to_string(), vec![entry]);
    world
        .reflections
        .insert("main".to_string(), OwnedReflection::compute([8, 8, 1]));

    let (success, buffers) = run(
        world,
        &["shaders/quality.hlsl"],
        &["out/quality.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        3,
    );

    assert!(success);
    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();

    assert_eq!(sh.binaries.len(), 4);
    assert_eq!(sh.entries.len(), 1);
    assert_eq!(sh.entries[0].binary_ids.len(), 4);

    let caps = DeviceCapabilities {
        shader_version: shader_model(6, 6),
        extensions: ShExtensions::empty(),
    };
    let uniforms = vec![("QUALITY".to_string(), "2".to_string())];

    let (entry_id, slot) = sh
        .find_first_compatible(
            "main",
            &uniforms,
            ShExtensions::empty(),
            ShExtensions::empty(),
            &caps,
        )
        .unwrap();
    assert_eq!(entry_id, 0);

    let binary = &sh.binaries[sh.entries[0].binary_ids[slot as usize] as usize];
    assert_eq!(binary.identifier.uniforms, uniforms);
}

#[test]
fn test_raytracing_stages_share_one_binary() {
    let raygen = ShEntryRuntime {
        is_shader_annotation: true,
        ..runtime("raygen", PipelineStage::Raygen)
    };
    let miss = ShEntryRuntime {
        is_shader_annotation: true,
        ..runtime("miss", PipelineStage::Miss)
    };
    let hit = ShEntryRuntime {
        is_shader_annotation: true,
        ..runtime("hit", PipelineStage::ClosestHit)
    };

    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/rt.hlsl".to_string(),
        vec![raygen, miss, hit],
    );

    world
        .reflections
        .insert("raygen".to_string(), OwnedReflection::default());
    world.reflections.insert(
        "miss".to_string(),
        OwnedReflection {
            payload_size: 16,
            ..Default::default()
        },
    );
    world.reflections.insert(
        "hit".to_string(),
        OwnedReflection {
            payload_size: 16,
            intersection_size: 8,
            ..Default::default()
        },
    );

    let (success, buffers) = run(
        world,
        &["shaders/rt.hlsl"],
        &["out/rt.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        1,
    );

    assert!(success);
    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();

    assert_eq!(sh.binaries.len(), 1);
    assert!(sh.binaries[0].has_shader_annotation);
    assert_eq!(sh.binaries[0].identifier.stage, PipelineStage::Raygen);
    assert_eq!(sh.entries.len(), 3);

    for entry in &sh.entries {
        assert_eq!(entry.binary_ids, vec![0]);
    }
}

#[test]
fn test_includes_recorded_relative() {
    let mut world = MockWorld::default();
    world.entries.insert(
        "shaders/basic.hlsl".to_string(),
        vec![runtime("main", PipelineStage::Compute)],
    );
    world
        .reflections
        .insert("main".to_string(), OwnedReflection::compute([8, 8, 1]));
    world.includes.insert(
        "shaders/basic.hlsl".to_string(),
        vec![IncludeInfo {
            file: "shaders/lights.hlsli".to_string(),
            file_size: 128,
            crc32c: 0xCAFE,
            timestamp: 0,
            counter: 1,
        }],
    );

    let (success, buffers) = run(
        world,
        &["shaders/basic.hlsl"],
        &["out/basic.oiSH"],
        &[BinaryType::Spirv],
        CompileType::Compile,
        1,
    );

    assert!(success);
    let sh = ShFile::read(buffers[0].as_ref().unwrap(), false).unwrap();

    assert_eq!(sh.includes.len(), 1);
    assert_eq!(sh.includes[0].relative_path, "lights.hlsli");
    assert_eq!(sh.includes[0].crc32c, 0xCAFE);
}

#[test]
fn test_preprocess_writes_expanded_source() {
    let world = MockWorld::default();

    let (success, buffers) = run(
        world,
        &["shaders/basic.hlsl"],
        &["out/basic.spv.hlsl"],
        &[BinaryType::Spirv],
        CompileType::Preprocess,
        1,
    );

    assert!(success);
    let text = String::from_utf8(buffers[0].clone().unwrap()).unwrap();
    assert_eq!(text, "// expanded\nsource of shaders/basic.hlsl");
}

#[test]
fn test_symbols_output() {
    let world = MockWorld::default();

    let (success, buffers) = run(
        world,
        &["shaders/basic.hlsl"],
        &["out/basic.txt"],
        &[BinaryType::Spirv],
        CompileType::Symbols,
        1,
    );

    assert!(success);
    let text = String::from_utf8(buffers[0].clone().unwrap()).unwrap();
    assert_eq!(text, "symbols of shaders/basic.hlsl");
}

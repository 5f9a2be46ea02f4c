//! The SH root container: binaries, entrypoints and include provenance of
//! one compiled shader source.

use bitflags::bitflags;

use crate::binaries::{BinaryInfo, ShExtensions, VENDOR_ALL, VENDOR_COUNT};
use crate::binaries::{SHADER_MODEL_MAX, SHADER_MODEL_MIN};
use crate::entries::{PipelineStage, ShEntry};
use crate::registers::{
    BinaryType, BufferKind, RegisterKind, Registers, ShBinding, ShBindings, ShRegister,
    ShRegisterRuntime, BINARY_TYPE_COUNT,
};
use crate::sb::{merge_array_dims, SbFile, SbStride, SbType};
use crate::{is_ascii, Error};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ShSettingsFlags: u32 {
        /// The file is embedded in a parent container that guarantees its
        /// identity; the magic number is omitted.
        const HIDE_MAGIC_NUMBER = 1 << 0;
        /// At least one short string in the file is not plain ASCII.
        const IS_UTF8 = 1 << 1;
    }
}

/// One file the shader source pulled in, recorded for dirty checking.
///
/// The CRC32C is computed over the file contents with `\r` bytes stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShInclude {
    /// Path relative to the source file's directory.
    pub relative_path: String,
    pub crc32c: u32,
}

/// Device limits the runtime holds against a binary identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub shader_version: u16,
    pub extensions: ShExtensions,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShFile {
    pub binaries: Vec<BinaryInfo>,
    pub entries: Vec<ShEntry>,
    /// Sorted by case-sensitive relative path.
    pub includes: Vec<ShInclude>,
    pub flags: ShSettingsFlags,
    pub compiler_version: u32,
    pub source_hash: u32,
}

impl ShFile {
    pub fn new(flags: ShSettingsFlags, compiler_version: u32, source_hash: u32) -> Self {
        Self {
            binaries: Vec::new(),
            entries: Vec::new(),
            includes: Vec::new(),
            flags,
            compiler_version,
            source_hash,
        }
    }

    /// Adds one compiled binary, enforcing the identifier, register and
    /// bindless invariants. The `BINDLESS`/`UNBOUND_ARRAY_SIZE` extension
    /// bits are derived from the register set before the identifier is
    /// compared against existing binaries.
    pub fn add_binary(&mut self, mut info: BinaryInfo) -> Result<(), Error> {
        if !BinaryType::ALL.iter().any(|t| info.has_blob(*t)) {
            return Err(Error::InvariantViolation(
                "binary requires at least one backend blob",
            ));
        }

        if info.vendor_mask == 0 {
            return Err(Error::InvariantViolation("binary vendor mask is required"));
        }

        if info.vendor_mask == u16::MAX {
            info.vendor_mask = VENDOR_ALL;
        }

        if info.vendor_mask >> VENDOR_COUNT as u16 != 0 {
            return Err(Error::InvariantViolation("binary vendor mask out of bounds"));
        }

        if info.identifier.uniforms.len() > 255 {
            return Err(Error::CapacityExceeded("binary is limited to 255 uniforms"));
        }

        match &info.identifier.entrypoint {
            Some(name) if name.is_empty() => {
                return Err(Error::InvariantViolation("binary entrypoint name is empty"));
            }
            Some(_) if info.has_shader_annotation => {
                return Err(Error::InvariantViolation(
                    "shader annotation binaries have no entrypoint name",
                ));
            }
            None if !info.has_shader_annotation => {
                return Err(Error::InvariantViolation(
                    "stage annotation binaries require an entrypoint name",
                ));
            }
            _ => {}
        }

        if info.identifier.shader_version < SHADER_MODEL_MIN
            || info.identifier.shader_version > SHADER_MODEL_MAX
        {
            return Err(Error::InvariantViolation(
                "shader model must be between 6.5 and 6.8",
            ));
        }

        if info.blob(BinaryType::Spirv).len() % 4 != 0 {
            return Err(Error::InvariantViolation("SPIRV blob is not a u32 array"));
        }

        let budget = BindingBudget::count(&info.registers)?;

        if budget.needs_bindless() || budget.unbound_array {
            info.identifier.extensions |= ShExtensions::BINDLESS;

            if budget.unbound_array {
                info.identifier.extensions |= ShExtensions::UNBOUND_ARRAY_SIZE;
            }

            budget.check_bindless_ceilings()?;
        }

        if self
            .binaries
            .iter()
            .any(|b| b.identifier == info.identifier)
        {
            return Err(Error::AlreadyDefined("binary identifier"));
        }

        if self.binaries.len() + 1 >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("binary table is limited to 16 bit"));
        }

        let mut utf8 = info
            .identifier
            .entrypoint
            .as_deref()
            .is_some_and(|e| !is_ascii(e.as_bytes()));

        for (i, (name, value)) in info.identifier.uniforms.iter().enumerate() {
            utf8 |= !is_ascii(name.as_bytes()) || !is_ascii(value.as_bytes());

            if info.identifier.uniforms[..i].iter().any(|(n, _)| n == name) {
                return Err(Error::AlreadyDefined("uniform name within binary"));
            }
        }

        if utf8 {
            self.flags |= ShSettingsFlags::IS_UTF8;
        }

        self.binaries.push(info);
        Ok(())
    }

    /// Adds one entrypoint, enforcing the stage specific group, wave size,
    /// payload and graphics I/O invariants.
    pub fn add_entrypoint(&mut self, entry: ShEntry) -> Result<(), Error> {
        if self.entries.len() + 1 >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("entry table is limited to 16 bit"));
        }

        if entry.name.is_empty() {
            return Err(Error::InvariantViolation("entry name is required"));
        }

        if entry.binary_ids.len() >= u8::MAX as usize {
            return Err(Error::CapacityExceeded("entry is limited to 254 binaries"));
        }

        if entry
            .binary_ids
            .iter()
            .any(|id| *id as usize >= self.binaries.len())
        {
            return Err(Error::InvariantViolation("entry references a missing binary"));
        }

        let stage = entry.stage;

        for slot in 0..4 {
            if entry.wave_size_nibble(slot) > 9 {
                return Err(Error::InvariantViolation("wave size nibble above 9"));
            }
        }

        if entry.wave_size != 0
            && !matches!(stage, PipelineStage::Compute | PipelineStage::Workgraph)
        {
            return Err(Error::InvariantViolation(
                "wave size only exists for compute and workgraph",
            ));
        }

        let group_total = entry.group[0] as u64 * entry.group[1] as u64 * entry.group[2] as u64;

        if !stage.has_group_size() && entry.group != [0; 3] {
            return Err(Error::InvariantViolation(
                "group size only exists for workgroup stages",
            ));
        }

        if stage.has_group_size() && group_total == 0 {
            return Err(Error::InvariantViolation("workgroup stages require a group size"));
        }

        if group_total > 512 {
            return Err(Error::CapacityExceeded("group size product above 512"));
        }

        if entry.group[0].max(entry.group[1]) > 512 {
            return Err(Error::CapacityExceeded("group width or height above 512"));
        }

        if entry.group[2] > 64 {
            return Err(Error::CapacityExceeded("group depth above 64"));
        }

        if stage.requires_payload() {
            if entry.payload_size == 0 {
                return Err(Error::InvariantViolation(
                    "hit, intersection and miss shaders require a payload size",
                ));
            }

            if entry.payload_size > 128 {
                return Err(Error::CapacityExceeded("payload size above 128 bytes"));
            }
        } else if entry.payload_size != 0 {
            return Err(Error::InvariantViolation(
                "payload size only exists for hit, intersection and miss shaders",
            ));
        }

        if stage.requires_intersection() {
            if entry.intersection_size == 0 {
                return Err(Error::InvariantViolation(
                    "hit and intersection shaders require an intersection size",
                ));
            }

            if entry.intersection_size > 32 {
                return Err(Error::CapacityExceeded("intersection size above 32 bytes"));
            }
        } else if entry.intersection_size != 0 {
            return Err(Error::InvariantViolation(
                "intersection size only exists for hit and intersection shaders",
            ));
        }

        if entry.payload_size % 2 != 0 || entry.intersection_size % 2 != 0 {
            return Err(Error::InvariantViolation(
                "payload and intersection sizes are 2 byte aligned",
            ));
        }

        let has_io = entry.inputs.iter().any(|i| *i != 0) || entry.outputs.iter().any(|o| *o != 0);

        if !stage.has_graphics_io() && has_io {
            return Err(Error::InvariantViolation(
                "graphics I/O only exists for graphics stages",
            ));
        }

        validate_io_slots(&entry.inputs)?;
        validate_io_slots(&entry.outputs)?;

        if entry.unique_input_semantics >= 16 {
            return Err(Error::CapacityExceeded("unique input semantics above 15"));
        }

        let unique_inputs = entry.unique_input_semantics as usize;

        if entry.semantic_names.len() < unique_inputs {
            return Err(Error::InvariantViolation(
                "semantic name list is shorter than the unique input count",
            ));
        }

        let unique_outputs = entry.semantic_names.len() - unique_inputs;
        if unique_outputs >= 16 {
            return Err(Error::CapacityExceeded("unique output semantics above 15"));
        }

        if !entry.semantic_names.is_empty() && !entry.has_semantic_names() {
            return Err(Error::InvariantViolation(
                "semantic names without any slot referencing them",
            ));
        }

        for partition in [
            &entry.semantic_names[..unique_inputs],
            &entry.semantic_names[unique_inputs..],
        ] {
            for (i, name) in partition.iter().enumerate() {
                if partition[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    return Err(Error::AlreadyDefined("semantic name within partition"));
                }
            }
        }

        validate_semantic_slots(
            &entry.input_semantic_names,
            &entry.inputs,
            entry.input_count(),
            unique_inputs,
        )?;
        validate_semantic_slots(
            &entry.output_semantic_names,
            &entry.outputs,
            entry.output_count(),
            unique_outputs,
        )?;

        if !is_ascii(entry.name.as_bytes())
            || entry
                .semantic_names
                .iter()
                .any(|n| !is_ascii(n.as_bytes()))
        {
            self.flags |= ShSettingsFlags::IS_UTF8;
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Adds one include, keeping the list sorted. Repeats with an equal
    /// CRC are dropped silently; a differing CRC is an error.
    pub fn add_include(&mut self, include: ShInclude) -> Result<(), Error> {
        if include.relative_path.is_empty() || include.crc32c == 0 {
            return Err(Error::InvariantViolation(
                "include path and CRC32C are required",
            ));
        }

        if let Some(existing) = self
            .includes
            .iter()
            .find(|i| i.relative_path == include.relative_path)
        {
            if existing.crc32c != include.crc32c {
                return Err(Error::AlreadyDefined("include with a different CRC32C"));
            }

            return Ok(());
        }

        if self.includes.len() + 1 >= 1 << 16 {
            return Err(Error::CapacityExceeded("include table is limited to 16 bit"));
        }

        if !is_ascii(include.relative_path.as_bytes()) {
            self.flags |= ShSettingsFlags::IS_UTF8;
        }

        let at = self
            .includes
            .iter()
            .position(|i| i.relative_path.as_str() > include.relative_path.as_str())
            .unwrap_or(self.includes.len());

        self.includes.insert(at, include);
        Ok(())
    }

    /// Merges two SH files compiled from the same source into a new one.
    ///
    /// Neither input is modified. Binaries with equal identifiers are merged
    /// (byte-equal blobs, compatible register sets); entries with equal
    /// names are merged (equal metadata, per-nibble wave size merge) and
    /// their binary references deduplicated.
    pub fn combine(a: &ShFile, b: &ShFile) -> Result<ShFile, Error> {
        if (a.flags ^ b.flags).contains(ShSettingsFlags::HIDE_MAGIC_NUMBER) {
            return Err(Error::Incompatible("hide magic number flag mismatch"));
        }

        if a.compiler_version != b.compiler_version {
            return Err(Error::Incompatible("compiler version mismatch"));
        }

        if a.source_hash != b.source_hash {
            return Err(Error::Incompatible("source hash mismatch"));
        }

        let mut combined = ShFile::new(
            a.flags | (b.flags & ShSettingsFlags::IS_UTF8),
            a.compiler_version,
            a.source_hash,
        );

        for include in a.includes.iter().chain(&b.includes) {
            combined.add_include(include.clone())?;
        }

        // Binaries of a first, merged with their b counterpart where the
        // identifier matches. remap maps b's binary ids into the combined
        // file.
        let mut remap = vec![0u16; b.binaries.len()];

        for (i, ai) in a.binaries.iter().enumerate() {
            let matched = b
                .binaries
                .iter()
                .position(|bi| bi.identifier == ai.identifier);

            let info = match matched {
                None => ai.clone(),
                Some(j) => {
                    remap[j] = i as u16;
                    merge_binaries(ai, &b.binaries[j])?
                }
            };

            combined.add_binary(info)?;
        }

        for (i, bi) in b.binaries.iter().enumerate() {
            if a.binaries
                .iter()
                .any(|ai| ai.identifier == bi.identifier)
            {
                continue;
            }

            combined.add_binary(bi.clone())?;
            remap[i] = combined.binaries.len() as u16 - 1;
        }

        // Entries of a first, merged with their b counterpart by name.
        for ai in &a.entries {
            let matched = b.entries.iter().find(|bi| bi.name == ai.name);

            let entry = match matched {
                None => ai.clone(),
                Some(bi) => {
                    let mut entry = merge_entries(ai, bi)?;

                    for id in &bi.binary_ids {
                        let id = remap[*id as usize];
                        if !entry.binary_ids.contains(&id) {
                            entry.binary_ids.push(id);
                        }
                    }

                    entry
                }
            };

            combined.add_entrypoint(entry)?;
        }

        for bi in &b.entries {
            if a.entries.iter().any(|ai| ai.name == bi.name) {
                continue;
            }

            let mut entry = bi.clone();
            entry.binary_ids = bi.binary_ids.iter().map(|id| remap[*id as usize]).collect();
            combined.add_entrypoint(entry)?;
        }

        Ok(combined)
    }

    /// First `(entry, binary slot)` pair matching the requested entrypoint,
    /// uniform values and extension constraints on the given device.
    pub fn find_first_compatible(
        &self,
        entrypoint: &str,
        uniforms: &[(String, String)],
        disallow: ShExtensions,
        require: ShExtensions,
        caps: &DeviceCapabilities,
    ) -> Option<(u16, u16)> {
        for (entry_id, entry) in self.entries.iter().enumerate() {
            if entry.name != entrypoint {
                continue;
            }

            for (slot, binary_id) in entry.binary_ids.iter().enumerate() {
                let binary = &self.binaries[*binary_id as usize];
                let identifier = &binary.identifier;

                if identifier.uniforms.as_slice() != uniforms {
                    continue;
                }

                if identifier.extensions.intersects(disallow)
                    || !identifier.extensions.contains(require)
                {
                    continue;
                }

                if identifier.shader_version > caps.shader_version {
                    continue;
                }

                // Dormant extensions never made it into the executable, so
                // the device does not have to support them.
                let active = identifier.extensions & !binary.dormant_extensions;
                if !caps.extensions.contains(active) {
                    continue;
                }

                return Some((entry_id as u16, slot as u16));
            }
        }

        None
    }
}

fn validate_io_slots(slots: &[u8; 16]) -> Result<(), Error> {
    let mut ended = false;

    for slot in slots {
        if *slot == 0 {
            ended = true;
            continue;
        }

        if ended {
            return Err(Error::InvariantViolation("graphics I/O slots must be dense"));
        }

        let ty = SbType(*slot);

        if !ty.is_valid() || ty.stride() == SbStride::X8 || ty.matrix() != 1 {
            return Err(Error::InvariantViolation(
                "graphics I/O slot carries an invalid type",
            ));
        }
    }

    Ok(())
}

fn validate_semantic_slots(
    semantics: &[u8; 16],
    slots: &[u8; 16],
    count: usize,
    unique: usize,
) -> Result<(), Error> {
    let any = semantics.iter().any(|s| *s != 0);

    let mut seen = [false; 256];

    for (i, semantic) in semantics.iter().enumerate().take(count) {
        if *semantic != 0 && slots[i] == 0 {
            return Err(Error::InvariantViolation(
                "semantic defined on an empty I/O slot",
            ));
        }

        if (*semantic >> 4) as usize > unique {
            return Err(Error::InvariantViolation("semantic name id out of bounds"));
        }

        if any {
            if seen[*semantic as usize] {
                return Err(Error::AlreadyDefined("semantic within entry"));
            }

            seen[*semantic as usize] = true;
        }
    }

    for semantic in &semantics[count..] {
        if *semantic != 0 {
            return Err(Error::InvariantViolation(
                "semantic defined past the I/O prefix",
            ));
        }
    }

    Ok(())
}

struct BindingBudget {
    sampler_spirv: u64,
    sampler_dxil: u64,
    cbv: u64,
    ubo: u64,
    uav: u64,
    srv: u64,
    rtas_spirv: u64,
    rtas_dxil: u64,
    image: u64,
    texture: u64,
    ssbo: u64,
    subpass_input: u64,
    unbound_array: bool,
}

impl BindingBudget {
    /// Buckets every register into the per-backend descriptor counters,
    /// with each register contributing the product of its array dimensions
    /// (an unbounded dimension counts as one slot and is flagged).
    fn count(registers: &Registers) -> Result<Self, Error> {
        let mut budget = Self {
            sampler_spirv: 0,
            sampler_dxil: 0,
            cbv: 0,
            ubo: 0,
            uav: 0,
            srv: 0,
            rtas_spirv: 0,
            rtas_dxil: 0,
            image: 0,
            texture: 0,
            ssbo: 0,
            subpass_input: 0,
            unbound_array: false,
        };

        let mut spirv_sets: Vec<u32> = Vec::new();

        for reg in registers {
            if reg.arrays.iter().any(|d| *d == 0) {
                budget.unbound_array = true;
            }

            let slots: u64 = reg.arrays.iter().map(|d| (*d).max(1) as u64).product();

            let spirv = reg.register.bindings.get(BinaryType::Spirv);
            let dxil = reg.register.bindings.get(BinaryType::Dxil);

            if spirv.is_set() && !spirv_sets.contains(&spirv.space) {
                if spirv_sets.len() == 4 {
                    return Err(Error::CapacityExceeded(
                        "binary uses more than 4 descriptor sets",
                    ));
                }

                spirv_sets.push(spirv.space);
            }

            match &reg.register.kind {
                RegisterKind::Sampler { .. } => {
                    if spirv.is_set() {
                        budget.sampler_spirv += slots;
                    }
                    if dxil.is_set() {
                        budget.sampler_dxil += slots;
                    }
                }
                RegisterKind::SubpassInput { .. } => {
                    budget.subpass_input += slots;
                }
                RegisterKind::Buffer {
                    kind: BufferKind::AccelerationStructure,
                    ..
                } => {
                    if spirv.is_set() {
                        budget.rtas_spirv += slots;
                    }
                    if dxil.is_set() {
                        budget.rtas_dxil += slots;
                        budget.srv += slots;
                    }
                }
                RegisterKind::Buffer {
                    kind: BufferKind::Constant,
                    ..
                } => {
                    if spirv.is_set() {
                        budget.ubo += slots;
                    }
                    if dxil.is_set() {
                        budget.cbv += slots;
                    }
                }
                RegisterKind::Buffer { write, .. } => {
                    if spirv.is_set() {
                        budget.ssbo += slots;
                    }
                    if dxil.is_set() {
                        if *write {
                            budget.uav += slots;
                        } else {
                            budget.srv += slots;
                        }
                    }
                }
                RegisterKind::Texture { write, .. } => {
                    if spirv.is_set() {
                        if *write {
                            budget.image += slots;
                        } else {
                            budget.texture += slots;
                        }
                    }
                    if dxil.is_set() {
                        if *write {
                            budget.uav += slots;
                        } else {
                            budget.srv += slots;
                        }
                    }
                }
            }
        }

        if budget.rtas_spirv.max(budget.rtas_dxil) > 16 {
            return Err(Error::CapacityExceeded(
                "binary uses more than 16 acceleration structures",
            ));
        }

        if budget.subpass_input > 8 {
            return Err(Error::CapacityExceeded("binary uses more than 8 subpass inputs"));
        }

        Ok(budget)
    }

    fn total_spirv(&self) -> u64 {
        self.sampler_spirv
            + self.ubo
            + self.rtas_spirv
            + self.image
            + self.texture
            + self.ssbo
            + self.subpass_input
    }

    /// Whether the legacy per-set binding budget is exceeded.
    fn needs_bindless(&self) -> bool {
        self.sampler_spirv.max(self.sampler_dxil) > 16
            || self.cbv.max(self.ubo) > 12
            || self.ssbo > 8
            || self.texture > 16
            || self.image > 4
            || self.srv > 128
            || self.uav > 64
            || self.total_spirv() > 44
    }

    fn check_bindless_ceilings(&self) -> Result<(), Error> {
        if self.sampler_spirv.max(self.sampler_dxil) > 2048
            || self.cbv.max(self.ubo) > 12
            || self.ssbo > 500_000
            || self.texture > 250_000
            || self.image > 250_000
            || self.srv + self.uav + self.cbv > 1_000_000
            || self.total_spirv() > 1_000_000
        {
            return Err(Error::CapacityExceeded(
                "binary exceeds the bindless descriptor ceilings",
            ));
        }

        Ok(())
    }
}

fn merge_binaries(a: &BinaryInfo, b: &BinaryInfo) -> Result<BinaryInfo, Error> {
    if a.vendor_mask != b.vendor_mask {
        return Err(Error::Incompatible("binary vendor mask mismatch"));
    }

    if a.has_shader_annotation != b.has_shader_annotation {
        return Err(Error::Incompatible("binary shader annotation mismatch"));
    }

    let mut binaries: [Vec<u8>; BINARY_TYPE_COUNT] = Default::default();

    for ty in BinaryType::ALL {
        let (blob_a, blob_b) = (a.blob(ty), b.blob(ty));

        binaries[ty as usize] = if !blob_a.is_empty() && !blob_b.is_empty() {
            if blob_a != blob_b {
                return Err(Error::Incompatible(
                    "binaries with equal identifier have different contents",
                ));
            }

            blob_a.to_vec()
        } else if !blob_a.is_empty() {
            blob_a.to_vec()
        } else {
            blob_b.to_vec()
        };
    }

    let mut registers = Registers::new();

    for rega in &a.registers {
        let matched = b.registers.iter().find(|regb| regb.name == rega.name);

        match matched {
            None => {
                registers.add_register(
                    rega.name.clone(),
                    if rega.arrays.is_empty() {
                        None
                    } else {
                        Some(rega.arrays.clone())
                    },
                    rega.register.clone(),
                    rega.shader_buffer.clone(),
                )?;
            }
            Some(regb) if regb.hash == rega.hash => {
                registers.add_register(
                    rega.name.clone(),
                    if rega.arrays.is_empty() {
                        None
                    } else {
                        Some(rega.arrays.clone())
                    },
                    rega.register.clone(),
                    rega.shader_buffer.clone(),
                )?;
            }
            Some(regb) => {
                let merged = merge_registers(rega, regb)?;
                let shader_buffer = match (&rega.shader_buffer, &regb.shader_buffer) {
                    (None, None) => None,
                    (Some(sa), Some(sb)) => Some(SbFile::combine(sa, sb)?),
                    _ => return Err(Error::Incompatible("register shader buffer mismatch")),
                };

                let arrays = merge_array_dims(&rega.arrays, &regb.arrays)?;

                registers.add_register(
                    rega.name.clone(),
                    if arrays.is_empty() { None } else { Some(arrays) },
                    merged,
                    shader_buffer,
                )?;
            }
        }
    }

    for regb in &b.registers {
        if a.registers.iter().any(|rega| rega.name == regb.name) {
            continue;
        }

        registers.add_register(
            regb.name.clone(),
            if regb.arrays.is_empty() {
                None
            } else {
                Some(regb.arrays.clone())
            },
            regb.register.clone(),
            regb.shader_buffer.clone(),
        )?;
    }

    Ok(BinaryInfo {
        identifier: a.identifier.clone(),
        registers,
        // Only extensions unused on both sides stay dormant.
        dormant_extensions: a.dormant_extensions & b.dormant_extensions,
        vendor_mask: a.vendor_mask,
        has_shader_annotation: a.has_shader_annotation,
        binaries,
    })
}

/// Merges two registers of the same name seen from different binaries.
///
/// The register types must be identical up to two cross-backend
/// equivalences: a DXIL `SamplerComparisonState` matches a SPIRV `Sampler`
/// (the comparison form wins) and the SPIRV combined-sampler bit is OR-ed in.
fn merge_registers(a: &ShRegisterRuntime, b: &ShRegisterRuntime) -> Result<ShRegister, Error> {
    let kind = match (&a.register.kind, &b.register.kind) {
        (
            RegisterKind::Sampler { comparison: ca },
            RegisterKind::Sampler { comparison: cb },
        ) => RegisterKind::Sampler {
            comparison: *ca || *cb,
        },
        (
            RegisterKind::Buffer { kind: ka, write: wa },
            RegisterKind::Buffer { kind: kb, write: wb },
        ) => {
            if ka != kb || wa != wb {
                return Err(Error::Incompatible("register buffer type mismatch"));
            }

            RegisterKind::Buffer {
                kind: *ka,
                write: *wa,
            }
        }
        (
            RegisterKind::Texture {
                ty: ta,
                layered: la,
                combined_sampler: csa,
                write: wa,
                texel: pa,
                format: fa,
            },
            RegisterKind::Texture {
                ty: tb,
                layered: lb,
                combined_sampler: csb,
                write: wb,
                texel: pb,
                format: fb,
            },
        ) => {
            if ta != tb || la != lb || wa != wb {
                return Err(Error::Incompatible("register texture type mismatch"));
            }

            if let (Some(pa), Some(pb)) = (pa, pb) {
                if pa != pb {
                    return Err(Error::Incompatible("texture texel primitive mismatch"));
                }
            }

            if let (Some(fa), Some(fb)) = (fa, fb) {
                if fa != fb {
                    return Err(Error::Incompatible("texture format mismatch"));
                }
            }

            let texel = pa.or(*pb);
            let format = fa.or(*fb);

            if let (Some(texel), Some(format)) = (texel, format) {
                if format.texel() != texel {
                    return Err(Error::Incompatible(
                        "texture format and texel primitive mismatch",
                    ));
                }
            }

            RegisterKind::Texture {
                ty: *ta,
                layered: *la,
                combined_sampler: *csa || *csb,
                write: *wa,
                texel,
                format,
            }
        }
        (
            RegisterKind::SubpassInput { attachment: aa },
            RegisterKind::SubpassInput { attachment: ab },
        ) => {
            if aa != ab {
                return Err(Error::Incompatible("subpass input attachment mismatch"));
            }

            RegisterKind::SubpassInput { attachment: *aa }
        }
        _ => return Err(Error::Incompatible("register type mismatch")),
    };

    let mut bindings = ShBindings::NONE;

    for ty in BinaryType::ALL {
        let (ba, bb) = (a.register.bindings.get(ty), b.register.bindings.get(ty));

        bindings.set(
            ty,
            match (ba.is_set(), bb.is_set()) {
                (true, true) => {
                    if ba != bb {
                        return Err(Error::Incompatible("register binding mismatch"));
                    }

                    ba
                }
                (true, false) => ba,
                (false, true) => bb,
                (false, false) => ShBinding::UNSET,
            },
        );
    }

    Ok(ShRegister {
        bindings,
        kind,
        used: a.register.used | b.register.used,
    })
}

fn merge_entries(a: &ShEntry, b: &ShEntry) -> Result<ShEntry, Error> {
    if a.stage != b.stage
        || a.unique_input_semantics != b.unique_input_semantics
        || a.group != b.group
        || a.intersection_size != b.intersection_size
        || a.payload_size != b.payload_size
        || a.inputs != b.inputs
        || a.outputs != b.outputs
        || a.input_semantic_names != b.input_semantic_names
        || a.output_semantic_names != b.output_semantic_names
    {
        return Err(Error::Incompatible("entries with equal name differ"));
    }

    if a.semantic_names.len() != b.semantic_names.len()
        || a.semantic_names
            .iter()
            .zip(&b.semantic_names)
            .any(|(na, nb)| !na.eq_ignore_ascii_case(nb))
    {
        return Err(Error::Incompatible("entry semantic names differ"));
    }

    let mut entry = a.clone();
    entry.wave_size = merge_wave_size(a.wave_size, b.wave_size)?;
    Ok(entry)
}

/// Per-nibble wave size merge: a zero slot takes the other side's value,
/// two nonzero slots must agree.
fn merge_wave_size(a: u16, b: u16) -> Result<u16, Error> {
    let mut out = 0;

    for slot in 0..4 {
        let na = a >> (slot * 4) & 0xF;
        let nb = b >> (slot * 4) & 0xF;

        if na != 0 && nb != 0 && na != nb {
            return Err(Error::Incompatible("entry wave size differs"));
        }

        out |= na.max(nb) << (slot * 4);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{merge_wave_size, DeviceCapabilities, ShFile, ShInclude, ShSettingsFlags};
    use crate::binaries::{shader_model, BinaryIdentifier, BinaryInfo, ShExtensions, VENDOR_ALL};
    use crate::entries::{PipelineStage, ShEntry};
    use crate::registers::{
        BinaryType, Registers, ShBinding, ShBindings, TextureType, UsageFlags,
    };
    use crate::Error;

    fn spirv_bindings(space: u32, binding: u32) -> ShBindings {
        let mut bindings = ShBindings::NONE;
        bindings.set(BinaryType::Spirv, ShBinding { space, binding });
        bindings
    }

    fn identifier(name: &str, stage: PipelineStage) -> BinaryIdentifier {
        BinaryIdentifier {
            entrypoint: Some(name.to_string()),
            uniforms: Vec::new(),
            extensions: ShExtensions::empty(),
            shader_version: shader_model(6, 5),
            stage,
        }
    }

    fn compute_binary(name: &str) -> BinaryInfo {
        let mut info = BinaryInfo::new(identifier(name, PipelineStage::Compute), VENDOR_ALL);
        info.binaries[BinaryType::Spirv as usize] = vec![1, 2, 3, 4];
        info
    }

    fn compute_entry(name: &str, binary_ids: Vec<u16>) -> ShEntry {
        let mut entry = ShEntry::new(name.to_string(), PipelineStage::Compute);
        entry.group = [8, 8, 1];
        entry.binary_ids = binary_ids;
        entry
    }

    fn sh_with_compute(name: &str) -> ShFile {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0xABCD);
        sh.add_binary(compute_binary(name)).unwrap();
        sh.add_entrypoint(compute_entry(name, vec![0])).unwrap();
        sh
    }

    #[test]
    fn test_add_binary_requires_blob() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        let mut info = compute_binary("main");
        info.binaries = Default::default();

        assert!(matches!(
            sh.add_binary(info),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_add_binary_rejects_duplicate_identifier() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_binary(compute_binary("main")).unwrap();

        assert!(matches!(
            sh.add_binary(compute_binary("main")),
            Err(Error::AlreadyDefined(_))
        ));
    }

    #[test]
    fn test_add_binary_rejects_misaligned_spirv() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        let mut info = compute_binary("main");
        info.binaries[BinaryType::Spirv as usize] = vec![1, 2, 3];

        assert!(matches!(
            sh.add_binary(info),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_utf8_flag_tracks_entrypoint() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_binary(compute_binary("gr\u{fc}n")).unwrap();
        assert!(sh.flags.contains(ShSettingsFlags::IS_UTF8));
    }

    #[test]
    fn test_bindless_detection() {
        // 17 read textures exceed the legacy texture budget of 16.
        let mut info = compute_binary("main");
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

        info.registers = registers;

        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_binary(info).unwrap();

        let extensions = sh.binaries[0].identifier.extensions;
        assert!(extensions.contains(ShExtensions::BINDLESS));
        assert!(!extensions.contains(ShExtensions::UNBOUND_ARRAY_SIZE));
    }

    #[test]
    fn test_unbound_array_detection() {
        let mut info = compute_binary("main");
        let mut registers = Registers::new();
        registers
            .add_texture(
                TextureType::D2,
                false,
                false,
                UsageFlags::SPIRV,
                None,
                "all_textures".to_string(),
                Some(vec![0]),
                spirv_bindings(0, 0),
            )
            .unwrap();
        info.registers = registers;

        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_binary(info).unwrap();

        let extensions = sh.binaries[0].identifier.extensions;
        assert!(extensions.contains(ShExtensions::BINDLESS));
        assert!(extensions.contains(ShExtensions::UNBOUND_ARRAY_SIZE));
    }

    #[test]
    fn test_add_entrypoint_group_rules() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_binary(compute_binary("main")).unwrap();

        // Compute without group size.
        let mut entry = ShEntry::new("main".to_string(), PipelineStage::Compute);
        entry.binary_ids = vec![0];
        assert!(sh.add_entrypoint(entry).is_err());

        // Group product above 512.
        let mut entry = compute_entry("main", vec![0]);
        entry.group = [32, 32, 1];
        assert!(sh.add_entrypoint(entry).is_err());

        // Vertex with group size.
        let mut entry = ShEntry::new("vs".to_string(), PipelineStage::Vertex);
        entry.group = [1, 1, 1];
        assert!(sh.add_entrypoint(entry).is_err());

        sh.add_entrypoint(compute_entry("main", vec![0])).unwrap();
    }

    #[test]
    fn test_add_entrypoint_missing_binary() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        assert!(matches!(
            sh.add_entrypoint(compute_entry("main", vec![0])),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_include_crc_conflict() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        sh.add_include(ShInclude {
            relative_path: "shared.hlsli".to_string(),
            crc32c: 0xAAAA,
        })
        .unwrap();

        // Same CRC is dropped silently.
        sh.add_include(ShInclude {
            relative_path: "shared.hlsli".to_string(),
            crc32c: 0xAAAA,
        })
        .unwrap();
        assert_eq!(sh.includes.len(), 1);

        assert!(matches!(
            sh.add_include(ShInclude {
                relative_path: "shared.hlsli".to_string(),
                crc32c: 0xBBBB,
            }),
            Err(Error::AlreadyDefined(_))
        ));
    }

    #[test]
    fn test_includes_stay_sorted() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);
        for path in ["b.hlsli", "a.hlsli", "c.hlsli"] {
            sh.add_include(ShInclude {
                relative_path: path.to_string(),
                crc32c: 1,
            })
            .unwrap();
        }

        let paths: Vec<_> = sh.includes.iter().map(|i| i.relative_path.as_str()).collect();
        assert_eq!(paths, ["a.hlsli", "b.hlsli", "c.hlsli"]);
    }

    #[test]
    fn test_combine_conflicting_spirv() {
        let a = sh_with_compute("main");
        let mut b = sh_with_compute("main");
        b.binaries[0].binaries[BinaryType::Spirv as usize] = vec![9, 9, 9, 9];

        assert!(matches!(
            ShFile::combine(&a, &b),
            Err(Error::Incompatible(_))
        ));
        // a is untouched.
        assert_eq!(a.binaries[0].blob(BinaryType::Spirv), [1, 2, 3, 4]);
    }

    #[test]
    fn test_combine_idempotent() {
        let a = sh_with_compute("main");
        let c = ShFile::combine(&a, &a).unwrap();

        assert_eq!(c.binaries.len(), 1);
        assert_eq!(c.entries.len(), 1);
        assert_eq!(c.entries[0].binary_ids, vec![0]);
    }

    #[test]
    fn test_combine_commutative_identifiers() {
        let a = sh_with_compute("main");
        let b = sh_with_compute("other");

        let ab = ShFile::combine(&a, &b).unwrap();
        let ba = ShFile::combine(&b, &a).unwrap();

        let mut ids_ab: Vec<_> = ab.binaries.iter().map(|b| b.identifier.clone()).collect();
        let mut ids_ba: Vec<_> = ba.binaries.iter().map(|b| b.identifier.clone()).collect();
        ids_ab.sort_by_key(|i| i.entrypoint.clone());
        ids_ba.sort_by_key(|i| i.entrypoint.clone());
        assert_eq!(ids_ab, ids_ba);

        assert_eq!(ab.entries.len(), 2);
        assert_eq!(ba.entries.len(), 2);
    }

    #[test]
    fn test_combine_requires_matching_source() {
        let a = sh_with_compute("main");
        let mut b = sh_with_compute("main");
        b.source_hash ^= 1;

        assert!(matches!(
            ShFile::combine(&a, &b),
            Err(Error::Incompatible(_))
        ));
    }

    #[test]
    fn test_wave_size_merge() {
        // (req, min, max, rec) nibbles packed low to high.
        let pack = |req: u16, min: u16, max: u16, rec: u16| req | min << 4 | max << 8 | rec << 12;

        assert_eq!(
            merge_wave_size(pack(0, 4, 8, 0), pack(0, 4, 8, 6)).unwrap(),
            pack(0, 4, 8, 6)
        );

        assert!(merge_wave_size(pack(0, 4, 8, 0), pack(0, 5, 8, 0)).is_err());
    }

    #[test]
    fn test_find_first_compatible() {
        let mut sh = ShFile::new(ShSettingsFlags::empty(), 1, 0);

        let mut fast = compute_binary("main");
        fast.identifier.extensions = ShExtensions::F64;
        sh.add_binary(fast).unwrap();
        sh.add_binary(compute_binary("main2")).unwrap();

        sh.add_entrypoint(compute_entry("main", vec![0])).unwrap();
        sh.add_entrypoint(compute_entry("main2", vec![1])).unwrap();

        let caps = DeviceCapabilities {
            shader_version: shader_model(6, 5),
            extensions: ShExtensions::empty(),
        };

        // F64 is not supported by the device.
        assert_eq!(
            sh.find_first_compatible(
                "main",
                &[],
                ShExtensions::empty(),
                ShExtensions::empty(),
                &caps
            ),
            None
        );

        let caps_f64 = DeviceCapabilities {
            shader_version: shader_model(6, 5),
            extensions: ShExtensions::F64,
        };
        assert_eq!(
            sh.find_first_compatible(
                "main",
                &[],
                ShExtensions::empty(),
                ShExtensions::empty(),
                &caps_f64
            ),
            Some((0, 0))
        );

        // Disallowing F64 skips the binary.
        assert_eq!(
            sh.find_first_compatible(
                "main",
                &[],
                ShExtensions::F64,
                ShExtensions::empty(),
                &caps_f64
            ),
            None
        );

        assert_eq!(
            sh.find_first_compatible(
                "main2",
                &[],
                ShExtensions::empty(),
                ShExtensions::empty(),
                &caps
            ),
            Some((1, 0))
        );
    }
}

//! Bit-exact reader and writer for the SH container.
//!
//! Layout, after the optional magic number: the fixed [`ShHeader`], the
//! embedded string DL (name pool), the embedded DL of shader buffer blobs,
//! the fixed binary records, the fixed entry records, the include CRCs, the
//! array dimension table, then one variable sized region per binary followed
//! by one per entry. The content hash is CRC32C over everything from the
//! `unique_uniforms` header field to the end of the file, so hiding the
//! magic number does not change it.

use bytes::{Buf, BufMut};

use crate::binaries::{BinaryIdentifier, BinaryInfo, ShExtensions};
use crate::dl::{DlDataType, DlFile};
use crate::entries::{PipelineStage, ShEntry};
use crate::registers::{
    BinaryType, RegisterKind, Registers, ShBinding, ShBindings, ShRegister, UsageFlags,
    BINARY_TYPE_COUNT,
};
use crate::sb::SbFile;
use crate::sh::{ShFile, ShInclude, ShSettingsFlags};
use crate::{DataSizeType, Decode, Encode, EofError, Error};

pub const SH_MAGIC: u32 = 0x4853_696F;
pub const SH_VERSION: u8 = 0x12;

const BINARY_FLAG_SPIRV: u8 = 1 << 0;
const BINARY_FLAG_DXIL: u8 = 1 << 1;
const BINARY_FLAG_SHADER_ANNOTATION: u8 = 1 << 4;

/// Offset of `unique_uniforms` within the header; the content hash covers
/// everything from there on.
const HASH_SPAN_OFFSET: usize = 12;

#[derive(Copy, Clone, Debug)]
struct ShHeader {
    compiler_version: u32,
    content_hash: u32,
    source_hash: u32,
    /// Offset of the uniform value region within the name pool.
    unique_uniforms: u16,
    version: u8,
    /// Two bits per backend: the width of its blob length fields.
    size_types: u8,
    binary_count: u16,
    stage_count: u16,
    include_file_count: u16,
    semantic_count: u16,
    array_dim_count: u16,
    register_name_count: u16,
}

impl Encode for ShHeader {
    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        self.compiler_version.encode(&mut buf);
        self.content_hash.encode(&mut buf);
        self.source_hash.encode(&mut buf);
        self.unique_uniforms.encode(&mut buf);
        self.version.encode(&mut buf);
        self.size_types.encode(&mut buf);
        self.binary_count.encode(&mut buf);
        self.stage_count.encode(&mut buf);
        self.include_file_count.encode(&mut buf);
        self.semantic_count.encode(&mut buf);
        self.array_dim_count.encode(&mut buf);
        self.register_name_count.encode(&mut buf);
    }
}

impl Decode for ShHeader {
    type Error = EofError;

    fn decode<B>(mut buf: B) -> Result<Self, Self::Error>
    where
        B: Buf,
    {
        Ok(Self {
            compiler_version: u32::decode(&mut buf)?,
            content_hash: u32::decode(&mut buf)?,
            source_hash: u32::decode(&mut buf)?,
            unique_uniforms: u16::decode(&mut buf)?,
            version: u8::decode(&mut buf)?,
            size_types: u8::decode(&mut buf)?,
            binary_count: u16::decode(&mut buf)?,
            stage_count: u16::decode(&mut buf)?,
            include_file_count: u16::decode(&mut buf)?,
            semantic_count: u16::decode(&mut buf)?,
            array_dim_count: u16::decode(&mut buf)?,
            register_name_count: u16::decode(&mut buf)?,
        })
    }
}

/// Name pool region bounds, derived from the header counts. The pool is
/// partitioned, in order: uniform names, uniform values, register names,
/// include paths, entry names, semantic names.
struct PoolRegions {
    unique_uniforms: usize,
    register_names: usize,
    includes: usize,
    entry_names: usize,
}

impl PoolRegions {
    fn derive(header: &ShHeader, pool_len: usize) -> Result<Self, Error> {
        let entry_names = pool_len
            .checked_sub(header.semantic_count as usize + header.stage_count as usize)
            .ok_or(Error::InvalidInput("name pool is shorter than its regions"))?;

        let includes = entry_names
            .checked_sub(header.include_file_count as usize)
            .ok_or(Error::InvalidInput("name pool is shorter than its regions"))?;

        let register_names = includes
            .checked_sub(header.register_name_count as usize)
            .ok_or(Error::InvalidInput("name pool is shorter than its regions"))?;

        if header.unique_uniforms as usize > register_names {
            return Err(Error::InvalidInput("uniform regions overlap register names"));
        }

        Ok(Self {
            unique_uniforms: header.unique_uniforms as usize,
            register_names,
            includes,
            entry_names,
        })
    }
}

struct StringTables {
    strings: DlFile,
    /// Pool position where the uniform value region starts.
    unique_uniforms: usize,
    register_names: usize,
    includes: usize,
    entry_names: usize,
    semantic_count: usize,
    arrays: Vec<Vec<u32>>,
    shader_buffers: Vec<SbFile>,
}

fn region_push(strings: &mut DlFile, start: usize, value: &str) -> Result<(), Error> {
    if strings.len() - start >= u16::MAX as usize - 1 {
        return Err(Error::CapacityExceeded("name pool region is limited to 16 bit"));
    }

    strings.push_string(value)?;
    Ok(())
}

/// Builds the deduplicated name pool plus the array and shader buffer
/// tables, in the region order the format mandates.
fn build_string_tables(file: &ShFile) -> Result<StringTables, Error> {
    let utf8 = file.flags.contains(ShSettingsFlags::IS_UTF8);
    let mut strings = DlFile::new(
        if utf8 { DlDataType::Utf8 } else { DlDataType::Ascii },
        true,
    );

    for binary in &file.binaries {
        for (name, _) in &binary.identifier.uniforms {
            if strings.find(0, usize::MAX, name.as_bytes()).is_none() {
                region_push(&mut strings, 0, name)?;
            }
        }
    }

    let unique_uniforms = strings.len();

    for binary in &file.binaries {
        for (_, value) in &binary.identifier.uniforms {
            if strings
                .find(unique_uniforms, usize::MAX, value.as_bytes())
                .is_none()
            {
                region_push(&mut strings, unique_uniforms, value)?;
            }
        }
    }

    let register_names = strings.len();
    let mut arrays: Vec<Vec<u32>> = Vec::new();
    let mut shader_buffers: Vec<SbFile> = Vec::new();

    for binary in &file.binaries {
        for reg in &binary.registers {
            if strings
                .find(register_names, usize::MAX, reg.name.as_bytes())
                .is_none()
            {
                region_push(&mut strings, register_names, reg.name.as_str())?;
            }

            if !reg.arrays.is_empty() && !arrays.contains(&reg.arrays) {
                if arrays.len() >= u16::MAX as usize - 1 {
                    return Err(Error::CapacityExceeded("array table is limited to 16 bit"));
                }

                arrays.push(reg.arrays.clone());
            }

            if let Some(sb) = &reg.shader_buffer {
                if !shader_buffers.iter().any(|s| s.hash == sb.hash) {
                    if shader_buffers.len() >= u16::MAX as usize - 1 {
                        return Err(Error::CapacityExceeded(
                            "shader buffer table is limited to 16 bit",
                        ));
                    }

                    shader_buffers.push(sb.clone());
                }
            }
        }
    }

    let includes = strings.len();

    for include in &file.includes {
        strings.push_string(&include.relative_path)?;
    }

    let entry_names = strings.len();

    for entry in &file.entries {
        strings.push_string(&entry.name)?;
    }

    let mut semantic_count = 0usize;

    for entry in &file.entries {
        for name in &entry.semantic_names {
            strings.push_string(name)?;
        }

        semantic_count += entry.semantic_names.len();

        if semantic_count >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("semantic table is limited to 16 bit"));
        }
    }

    Ok(StringTables {
        strings,
        unique_uniforms,
        register_names,
        includes,
        entry_names,
        semantic_count,
        arrays,
        shader_buffers,
    })
}

impl ShFile {
    /// Serializes the file. The returned bytes start with the magic number
    /// unless `HIDE_MAGIC_NUMBER` is set.
    pub fn write(&self) -> Result<Vec<u8>, Error> {
        let tables = build_string_tables(self)?;

        let mut blob_size_types = [DataSizeType::U8; BINARY_TYPE_COUNT];

        for binary in &self.binaries {
            for ty in BinaryType::ALL {
                let len = binary.blob(ty).len();
                if len != 0 {
                    blob_size_types[ty as usize] =
                        blob_size_types[ty as usize].max(DataSizeType::required(len as u64));
                }
            }
        }

        let mut out = Vec::new();

        if !self.flags.contains(ShSettingsFlags::HIDE_MAGIC_NUMBER) {
            SH_MAGIC.encode(&mut out);
        }

        let header_at = out.len();

        ShHeader {
            compiler_version: self.compiler_version,
            content_hash: 0,
            source_hash: self.source_hash,
            unique_uniforms: tables.unique_uniforms as u16,
            version: SH_VERSION,
            size_types: blob_size_types[0] as u8 | (blob_size_types[1] as u8) << 2,
            binary_count: self.binaries.len() as u16,
            stage_count: self.entries.len() as u16,
            include_file_count: self.includes.len() as u16,
            semantic_count: tables.semantic_count as u16,
            array_dim_count: tables.arrays.len() as u16,
            register_name_count: (tables.includes - tables.register_names) as u16,
        }
        .encode(&mut out);

        tables.strings.write(&mut out);

        let mut shader_buffer_dl = DlFile::new(DlDataType::Data, true);
        for sb in &tables.shader_buffers {
            let mut blob = Vec::new();
            sb.write(&mut blob, true);
            shader_buffer_dl.push_data(blob)?;
        }
        shader_buffer_dl.write(&mut out);

        for binary in &self.binaries {
            self.write_binary_fixed(binary, &tables, &mut out)?;
        }

        for entry in &self.entries {
            (entry.stage as u8).encode(&mut out);
            (entry.binary_ids.len() as u8).encode(&mut out);
        }

        for include in &self.includes {
            include.crc32c.encode(&mut out);
        }

        for array in &tables.arrays {
            (array.len() as u8).encode(&mut out);
        }

        for array in &tables.arrays {
            for dim in array {
                dim.encode(&mut out);
            }
        }

        for binary in &self.binaries {
            self.write_binary_dynamic(binary, &tables, blob_size_types, &mut out)?;
        }

        for entry in &self.entries {
            write_entry_dynamic(entry, &mut out);
        }

        let span = header_at + HASH_SPAN_OFFSET;
        let hash = crc32c::crc32c(&out[span..]);
        out[header_at + 4..header_at + 8].copy_from_slice(&hash.to_le_bytes());

        Ok(out)
    }

    fn write_binary_fixed(
        &self,
        binary: &BinaryInfo,
        tables: &StringTables,
        out: &mut Vec<u8>,
    ) -> Result<(), Error> {
        let mut binary_flags = 0u8;

        for ty in BinaryType::ALL {
            if binary.has_blob(ty) {
                binary_flags |= 1 << ty as u8;
            }
        }

        if binary.has_shader_annotation {
            binary_flags |= BINARY_FLAG_SHADER_ANNOTATION;
        }

        let entrypoint = match &binary.identifier.entrypoint {
            None => u16::MAX,
            Some(name) => {
                let at = tables
                    .strings
                    .find(
                        tables.entry_names,
                        tables.entry_names + self.entries.len(),
                        name.as_bytes(),
                    )
                    .ok_or(Error::InvariantViolation(
                        "binary entrypoint is not linked to an entry",
                    ))?;

                (at - tables.entry_names) as u16
            }
        };

        let version = binary.identifier.shader_version;
        let shader_model = ((version >> 4) as u8 & 0xF0) | (version as u8 & 0xF);

        shader_model.encode(&mut *out);
        (binary.identifier.stage as u8).encode(&mut *out);
        entrypoint.encode(&mut *out);
        binary.vendor_mask.encode(&mut *out);
        (binary.identifier.uniforms.len() as u8).encode(&mut *out);
        binary_flags.encode(&mut *out);
        binary.identifier.extensions.bits().encode(&mut *out);
        binary.dormant_extensions.bits().encode(&mut *out);
        (binary.registers.len() as u16).encode(&mut *out);
        0u16.encode(&mut *out);

        Ok(())
    }

    fn write_binary_dynamic(
        &self,
        binary: &BinaryInfo,
        tables: &StringTables,
        blob_size_types: [DataSizeType; BINARY_TYPE_COUNT],
        out: &mut Vec<u8>,
    ) -> Result<(), Error> {
        for (name, _) in &binary.identifier.uniforms {
            let at = tables
                .strings
                .find(0, tables.unique_uniforms, name.as_bytes())
                .expect("uniform names were pooled");
            (at as u16).encode(&mut *out);
        }

        for (_, value) in &binary.identifier.uniforms {
            let at = tables
                .strings
                .find(tables.unique_uniforms, tables.register_names, value.as_bytes())
                .expect("uniform values were pooled");
            ((at - tables.unique_uniforms) as u16).encode(&mut *out);
        }

        for reg in &binary.registers {
            let name_at = tables
                .strings
                .find(tables.register_names, tables.includes, reg.name.as_bytes())
                .expect("register names were pooled");
            let name_id = (name_at - tables.register_names) as u16;

            let array_id = if reg.arrays.is_empty() {
                u16::MAX
            } else {
                tables
                    .arrays
                    .iter()
                    .position(|a| *a == reg.arrays)
                    .expect("register arrays were pooled") as u16
            };

            let payload = if reg.register.kind.is_buffer() {
                match &reg.shader_buffer {
                    None => u16::MAX,
                    Some(sb) => tables
                        .shader_buffers
                        .iter()
                        .position(|s| s.hash == sb.hash)
                        .expect("shader buffers were pooled") as u16,
                }
            } else {
                reg.register.kind.payload()
            };

            for ty in BinaryType::ALL {
                let binding = reg.register.bindings.get(ty);
                binding.space.encode(&mut *out);
                binding.binding.encode(&mut *out);
            }

            reg.register.kind.type_byte().encode(&mut *out);
            reg.register.used.bits().encode(&mut *out);
            payload.encode(&mut *out);
            array_id.encode(&mut *out);
            name_id.encode(&mut *out);
        }

        for ty in BinaryType::ALL {
            let len = binary.blob(ty).len();
            if len != 0 {
                blob_size_types[ty as usize].write(&mut *out, len as u64);
            }
        }

        for ty in BinaryType::ALL {
            out.extend_from_slice(binary.blob(ty));
        }

        Ok(())
    }

    /// Parses a serialized SH file, validating the content hash before any
    /// structure is trusted and rebuilding the tree through the builder
    /// calls so every container invariant is re-checked.
    pub fn read(data: &[u8], is_sub_file: bool) -> Result<ShFile, Error> {
        let mut buf = data;

        if !is_sub_file {
            let magic = u32::decode(&mut buf)?;
            if magic != SH_MAGIC {
                return Err(Error::InvalidInput("bad SH magic number"));
            }
        }

        let header_at = data.len() - buf.remaining();
        let header = ShHeader::decode(&mut buf)?;

        if header.version != SH_VERSION {
            return Err(Error::InvalidInput("unsupported SH version"));
        }

        if header.size_types >> 4 != 0 {
            return Err(Error::InvalidInput("reserved SH size type bits set"));
        }

        let span = header_at + HASH_SPAN_OFFSET;
        if crc32c::crc32c(&data[span..]) != header.content_hash {
            return Err(Error::InvalidInput("SH content hash mismatch"));
        }

        let blob_size_types = [
            DataSizeType::from_bits(header.size_types),
            DataSizeType::from_bits(header.size_types >> 2),
        ];

        let strings = DlFile::read(&mut buf, true)?;
        let shader_buffer_dl = DlFile::read(&mut buf, true)?;

        let shader_buffers: Vec<SbFile> = (0..shader_buffer_dl.len())
            .map(|i| SbFile::read(shader_buffer_dl.entry(i), true))
            .collect::<Result<_, _>>()?;

        let regions = PoolRegions::derive(&header, strings.len())?;

        let mut flags = ShSettingsFlags::empty();
        if is_sub_file {
            flags |= ShSettingsFlags::HIDE_MAGIC_NUMBER;
        }
        if strings.data_type() == DlDataType::Utf8 {
            flags |= ShSettingsFlags::IS_UTF8;
        }

        let mut file = ShFile::new(flags, header.compiler_version, header.source_hash);

        let mut raw_binaries = Vec::with_capacity(header.binary_count as usize);

        for _ in 0..header.binary_count {
            let shader_model = u8::decode(&mut buf)?;
            let stage = PipelineStage::from_u8(u8::decode(&mut buf)?)?;
            let entrypoint = u16::decode(&mut buf)?;
            let vendor_mask = u16::decode(&mut buf)?;
            let uniform_count = u8::decode(&mut buf)?;
            let binary_flags = u8::decode(&mut buf)?;

            if binary_flags
                & !(BINARY_FLAG_SPIRV | BINARY_FLAG_DXIL | BINARY_FLAG_SHADER_ANNOTATION)
                != 0
            {
                return Err(Error::InvalidInput("reserved binary flag bits set"));
            }

            let extensions = ShExtensions::from_bits(u32::decode(&mut buf)?)
                .ok_or(Error::InvalidInput("reserved extension bits set"))?;
            let dormant = ShExtensions::from_bits(u32::decode(&mut buf)?)
                .ok_or(Error::InvalidInput("reserved extension bits set"))?;

            let register_count = u16::decode(&mut buf)?;
            let padding = u16::decode(&mut buf)?;
            if padding != 0 {
                return Err(Error::InvalidInput("non zero binary record padding"));
            }

            raw_binaries.push(RawBinary {
                shader_model,
                stage,
                entrypoint,
                vendor_mask,
                uniform_count,
                binary_flags,
                extensions,
                dormant,
                register_count,
            });
        }

        let mut raw_entries = Vec::with_capacity(header.stage_count as usize);

        for _ in 0..header.stage_count {
            let stage = PipelineStage::from_u8(u8::decode(&mut buf)?)?;
            let binary_count = u8::decode(&mut buf)?;
            raw_entries.push((stage, binary_count));
        }

        let mut include_crcs = Vec::with_capacity(header.include_file_count as usize);
        for _ in 0..header.include_file_count {
            include_crcs.push(u32::decode(&mut buf)?);
        }

        let mut array_lens = Vec::with_capacity(header.array_dim_count as usize);
        for _ in 0..header.array_dim_count {
            let len = u8::decode(&mut buf)?;
            if len == 0 || len > 32 {
                return Err(Error::InvalidInput("array dimension count out of range"));
            }

            array_lens.push(len as usize);
        }

        let arrays: Vec<Vec<u32>> = array_lens
            .into_iter()
            .map(|len| {
                (0..len)
                    .map(|_| u32::decode(&mut buf).map_err(Error::from))
                    .collect()
            })
            .collect::<Result<_, _>>()?;

        let tables = ReadTables {
            strings: &strings,
            regions: &regions,
            arrays: &arrays,
            shader_buffers: &shader_buffers,
            blob_size_types,
            stage_count: header.stage_count,
        };

        for raw in &raw_binaries {
            let info = read_binary_dynamic(&mut buf, raw, &tables)?;
            file.add_binary(info)?;
        }

        let mut semantic_cursor = regions.entry_names + header.stage_count as usize;

        for (i, (stage, binary_count)) in raw_entries.iter().enumerate() {
            let entry = read_entry_dynamic(
                &mut buf,
                strings.string(regions.entry_names + i).to_string(),
                *stage,
                *binary_count,
                &strings,
                &mut semantic_cursor,
            )?;

            file.add_entrypoint(entry)?;
        }

        if semantic_cursor != strings.len() {
            return Err(Error::InvalidInput("semantic name region was not consumed"));
        }

        for (i, crc) in include_crcs.into_iter().enumerate() {
            file.add_include(ShInclude {
                relative_path: strings.string(regions.includes + i).to_string(),
                crc32c: crc,
            })?;
        }

        if buf.remaining() != 0 {
            return Err(Error::InvalidInput("trailing bytes after SH file"));
        }

        Ok(file)
    }
}

/// Fixed-size part of a serialized binary record.
struct RawBinary {
    shader_model: u8,
    stage: PipelineStage,
    entrypoint: u16,
    vendor_mask: u16,
    uniform_count: u8,
    binary_flags: u8,
    extensions: ShExtensions,
    dormant: ShExtensions,
    register_count: u16,
}

/// Shared lookup state while reading the variable regions.
struct ReadTables<'a> {
    strings: &'a DlFile,
    regions: &'a PoolRegions,
    arrays: &'a [Vec<u32>],
    shader_buffers: &'a [SbFile],
    blob_size_types: [DataSizeType; BINARY_TYPE_COUNT],
    stage_count: u16,
}

fn read_binary_dynamic(
    buf: &mut &[u8],
    raw: &RawBinary,
    tables: &ReadTables<'_>,
) -> Result<BinaryInfo, Error> {
    let ReadTables {
        strings,
        regions,
        arrays,
        shader_buffers,
        blob_size_types,
        stage_count,
    } = tables;

    let entrypoint = if raw.binary_flags & BINARY_FLAG_SHADER_ANNOTATION != 0 {
        if raw.entrypoint != u16::MAX {
            return Err(Error::InvalidInput(
                "library binary carries an entrypoint index",
            ));
        }

        None
    } else {
        if raw.entrypoint >= *stage_count {
            return Err(Error::InvalidInput("binary entrypoint index out of bounds"));
        }

        Some(
            strings
                .string(regions.entry_names + raw.entrypoint as usize)
                .to_string(),
        )
    };

    let mut name_ids = Vec::with_capacity(raw.uniform_count as usize);
    for _ in 0..raw.uniform_count {
        name_ids.push(u16::decode(&mut *buf)? as usize);
    }

    let mut value_ids = Vec::with_capacity(raw.uniform_count as usize);
    for _ in 0..raw.uniform_count {
        value_ids.push(u16::decode(&mut *buf)? as usize);
    }

    let mut uniforms = Vec::with_capacity(raw.uniform_count as usize);

    for (name_id, value_id) in name_ids.into_iter().zip(value_ids) {
        if name_id >= regions.unique_uniforms {
            return Err(Error::InvalidInput("uniform name id out of bounds"));
        }

        if regions.unique_uniforms + value_id >= regions.register_names {
            return Err(Error::InvalidInput("uniform value id out of bounds"));
        }

        uniforms.push((
            strings.string(name_id).to_string(),
            strings.string(regions.unique_uniforms + value_id).to_string(),
        ));
    }

    let mut registers = Registers::new();

    for _ in 0..raw.register_count {
        let mut bindings = ShBindings::NONE;

        for ty in BinaryType::ALL {
            let space = u32::decode(&mut *buf)?;
            let binding = u32::decode(&mut *buf)?;
            bindings.set(ty, ShBinding { space, binding });
        }

        let type_byte = u8::decode(&mut *buf)?;
        let used = UsageFlags::from_bits(u8::decode(&mut *buf)?)
            .ok_or(Error::InvalidInput("reserved register usage bits set"))?;
        let payload = u16::decode(&mut *buf)?;
        let array_id = u16::decode(&mut *buf)?;
        let name_id = u16::decode(&mut *buf)?;

        if regions.register_names + name_id as usize >= regions.includes {
            return Err(Error::InvalidInput("register name id out of bounds"));
        }

        let name = strings
            .string(regions.register_names + name_id as usize)
            .to_string();

        let reg_arrays = if array_id == u16::MAX {
            None
        } else {
            Some(
                arrays
                    .get(array_id as usize)
                    .ok_or(Error::InvalidInput("register array id out of bounds"))?
                    .clone(),
            )
        };

        // Buffer registers store their shader buffer id in the payload
        // word; every other kind interprets it directly.
        let is_buffer_type = {
            let base = type_byte & 0x0F;
            (2..=8).contains(&base)
        };

        let (kind_payload, shader_buffer) = if is_buffer_type {
            let sb = if payload == u16::MAX {
                None
            } else {
                Some(
                    shader_buffers
                        .get(payload as usize)
                        .ok_or(Error::InvalidInput("shader buffer id out of bounds"))?
                        .clone(),
                )
            };

            (0, sb)
        } else {
            (payload, None)
        };

        let kind = RegisterKind::from_type_byte(type_byte, kind_payload)?;

        registers.add_register(
            name,
            reg_arrays,
            ShRegister {
                bindings,
                kind,
                used,
            },
            shader_buffer,
        )?;
    }

    let mut blob_lens = [0usize; BINARY_TYPE_COUNT];

    for ty in BinaryType::ALL {
        if raw.binary_flags & (1 << ty as u8) != 0 {
            blob_lens[ty as usize] = blob_size_types[ty as usize].read(&mut *buf)? as usize;

            if blob_lens[ty as usize] == 0 {
                return Err(Error::InvalidInput("binary declares an empty blob"));
            }
        }
    }

    let mut binaries: [Vec<u8>; BINARY_TYPE_COUNT] = Default::default();

    for ty in BinaryType::ALL {
        let len = blob_lens[ty as usize];

        if buf.remaining() < len {
            return Err(Error::UnexpectedEof(EofError {
                on: "binary blob",
                remaining: buf.remaining(),
                expected: len,
            }));
        }

        let mut blob = vec![0; len];
        buf.copy_to_slice(&mut blob);
        binaries[ty as usize] = blob;
    }

    Ok(BinaryInfo {
        identifier: BinaryIdentifier {
            entrypoint,
            uniforms,
            extensions: raw.extensions,
            shader_version: ((raw.shader_model as u16 & 0xF0) << 4)
                | (raw.shader_model as u16 & 0xF),
            stage: raw.stage,
        },
        registers,
        dormant_extensions: raw.dormant,
        vendor_mask: raw.vendor_mask,
        has_shader_annotation: raw.binary_flags & BINARY_FLAG_SHADER_ANNOTATION != 0,
        binaries,
    })
}

fn write_entry_dynamic(entry: &ShEntry, out: &mut Vec<u8>) {
    let stage = entry.stage;

    if stage.has_graphics_io() {
        let inputs = entry.input_count();
        let outputs = entry.output_count();
        let has_semantics = entry.has_semantic_names();

        (inputs as u8 | if has_semantics { 0x80 } else { 0 }).encode(&mut *out);
        (outputs as u8).encode(&mut *out);
        out.extend_from_slice(&entry.inputs[..inputs]);
        out.extend_from_slice(&entry.outputs[..outputs]);

        if has_semantics {
            let unique_outputs = entry.semantic_names.len() - entry.unique_input_semantics as usize;
            (entry.unique_input_semantics | (unique_outputs as u8) << 4).encode(&mut *out);
            out.extend_from_slice(&entry.input_semantic_names[..inputs]);
            out.extend_from_slice(&entry.output_semantic_names[..outputs]);
        }
    }

    if stage.has_group_size() {
        entry.group[0].encode(&mut *out);
        entry.group[1].encode(&mut *out);
        entry.group[2].encode(&mut *out);
        entry.wave_size.encode(&mut *out);
    }

    if stage.requires_intersection() {
        entry.intersection_size.encode(&mut *out);
    }

    if stage.requires_payload() {
        entry.payload_size.encode(&mut *out);
    }

    for id in &entry.binary_ids {
        id.encode(&mut *out);
    }
}

fn read_entry_dynamic(
    buf: &mut &[u8],
    name: String,
    stage: PipelineStage,
    binary_count: u8,
    strings: &DlFile,
    semantic_cursor: &mut usize,
) -> Result<ShEntry, Error> {
    let mut entry = ShEntry::new(name, stage);

    if stage.has_graphics_io() {
        let inputs_raw = u8::decode(&mut *buf)?;
        let has_semantics = inputs_raw & 0x80 != 0;
        let inputs = (inputs_raw & 0x7F) as usize;
        let outputs = u8::decode(&mut *buf)? as usize;

        if inputs > 16 || outputs > 16 {
            return Err(Error::InvalidInput("graphics I/O count above 16"));
        }

        if buf.remaining() < inputs + outputs {
            return Err(Error::UnexpectedEof(EofError {
                on: "graphics I/O slots",
                remaining: buf.remaining(),
                expected: inputs + outputs,
            }));
        }

        buf.copy_to_slice(&mut entry.inputs[..inputs]);
        buf.copy_to_slice(&mut entry.outputs[..outputs]);

        if has_semantics {
            let uniques = u8::decode(&mut *buf)?;
            let unique_inputs = (uniques & 0xF) as usize;
            let unique_outputs = (uniques >> 4) as usize;

            if buf.remaining() < inputs + outputs {
                return Err(Error::UnexpectedEof(EofError {
                    on: "semantic slots",
                    remaining: buf.remaining(),
                    expected: inputs + outputs,
                }));
            }

            buf.copy_to_slice(&mut entry.input_semantic_names[..inputs]);
            buf.copy_to_slice(&mut entry.output_semantic_names[..outputs]);

            entry.unique_input_semantics = unique_inputs as u8;

            let total = unique_inputs + unique_outputs;

            if *semantic_cursor + total > strings.len() {
                return Err(Error::InvalidInput("semantic name region out of bounds"));
            }

            for i in 0..total {
                entry
                    .semantic_names
                    .push(strings.string(*semantic_cursor + i).to_string());
            }

            *semantic_cursor += total;
        }
    }

    if stage.has_group_size() {
        entry.group[0] = u16::decode(&mut *buf)?;
        entry.group[1] = u16::decode(&mut *buf)?;
        entry.group[2] = u16::decode(&mut *buf)?;
        entry.wave_size = u16::decode(&mut *buf)?;
    }

    if stage.requires_intersection() {
        entry.intersection_size = u8::decode(&mut *buf)?;
    }

    if stage.requires_payload() {
        entry.payload_size = u8::decode(&mut *buf)?;
    }

    for _ in 0..binary_count {
        entry.binary_ids.push(u16::decode(&mut *buf)?);
    }

    Ok(entry)
}

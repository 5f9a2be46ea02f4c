//! Resource registers of a compiled binary: samplers, buffers, textures and
//! subpass inputs, each with one binding tuple per backend.

use std::hash::Hasher;
use std::ops::Deref;

use bitflags::bitflags;
use fnv::FnvHasher;

use crate::sb::{SbFile, SbFlags};
use crate::Error;

/// Backends a binary can carry bytecode for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryType {
    Spirv = 0,
    Dxil = 1,
}

pub const BINARY_TYPE_COUNT: usize = 2;

impl BinaryType {
    pub const ALL: [Self; BINARY_TYPE_COUNT] = [Self::Spirv, Self::Dxil];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Spirv => "SPV",
            Self::Dxil => "DXIL",
        }
    }
}

bitflags! {
    /// Per-backend register or binary usage bits, indexed by [`BinaryType`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UsageFlags: u8 {
        const SPIRV = 1 << 0;
        const DXIL = 1 << 1;
    }
}

impl UsageFlags {
    pub fn of(binary_type: BinaryType) -> Self {
        Self::from_bits_retain(1 << binary_type as u8)
    }
}

/// One backend binding tuple. `(u32::MAX, u32::MAX)` means the register is
/// not present for that backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShBinding {
    pub space: u32,
    pub binding: u32,
}

impl ShBinding {
    pub const UNSET: Self = Self {
        space: u32::MAX,
        binding: u32::MAX,
    };

    pub const fn is_set(self) -> bool {
        self.space != u32::MAX || self.binding != u32::MAX
    }

    /// The 8-byte word the register hash folds.
    pub(crate) const fn as_u64(self) -> u64 {
        self.space as u64 | (self.binding as u64) << 32
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShBindings(pub [ShBinding; BINARY_TYPE_COUNT]);

impl ShBindings {
    pub const NONE: Self = Self([ShBinding::UNSET; BINARY_TYPE_COUNT]);

    pub fn get(&self, binary_type: BinaryType) -> ShBinding {
        self.0[binary_type as usize]
    }

    pub fn set(&mut self, binary_type: BinaryType, binding: ShBinding) {
        self.0[binary_type as usize] = binding;
    }

    pub fn any_set(&self) -> bool {
        self.0.iter().any(|b| b.is_set())
    }
}

impl Default for ShBindings {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferKind {
    Constant,
    ByteAddress,
    Structured,
    /// Structured buffer with an append/consume atomic counter.
    StructuredAtomic,
    Storage,
    StorageAtomic,
    AccelerationStructure,
}

impl BufferKind {
    /// Whether the buffer contents are described by an embedded SB file.
    pub const fn has_layout(self) -> bool {
        !matches!(self, Self::ByteAddress | Self::AccelerationStructure)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureType {
    D1,
    D2,
    D3,
    Cube,
    D2Ms,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TexturePrimitive {
    UInt = 0,
    SInt = 1,
    UNorm = 2,
    SNorm = 3,
    Float = 4,
    Double = 5,
}

/// Texel interpretation of a texture register: primitive plus component
/// count (1..=4).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TexelFormat {
    pub primitive: TexturePrimitive,
    pub components: u8,
}

impl TexelFormat {
    const NONE_BYTE: u8 = 6;

    pub(crate) fn to_byte(format: Option<Self>) -> u8 {
        match format {
            None => Self::NONE_BYTE,
            Some(f) => f.primitive as u8 | (f.components - 1) << 4,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Option<Self>, Error> {
        if byte & 0xC0 != 0 {
            return Err(Error::InvalidInput("reserved texel format bits set"));
        }

        let primitive = match byte & 0x0F {
            0 => TexturePrimitive::UInt,
            1 => TexturePrimitive::SInt,
            2 => TexturePrimitive::UNorm,
            3 => TexturePrimitive::SNorm,
            4 => TexturePrimitive::Float,
            5 => TexturePrimitive::Double,
            6 => return Ok(None),
            _ => return Err(Error::InvalidInput("unknown texel primitive")),
        };

        Ok(Some(Self {
            primitive,
            components: (byte >> 4) + 1,
        }))
    }
}

/// Uncompressed texture formats a writable texture register can declare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureFormatId {
    R8 = 1,
    Rg8,
    Rgba8,
    R8Snorm,
    Rg8Snorm,
    Rgba8Snorm,
    R8Uint,
    Rg8Uint,
    Rgba8Uint,
    R8Sint,
    Rg8Sint,
    Rgba8Sint,
    R16,
    Rg16,
    Rgba16,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Rg32Uint,
    Rgba32Uint,
    R32Sint,
    Rg32Sint,
    Rgba32Sint,
}

impl TextureFormatId {
    pub fn from_u8(value: u8) -> Result<Option<Self>, Error> {
        const TABLE: [TextureFormatId; 27] = [
            TextureFormatId::R8,
            TextureFormatId::Rg8,
            TextureFormatId::Rgba8,
            TextureFormatId::R8Snorm,
            TextureFormatId::Rg8Snorm,
            TextureFormatId::Rgba8Snorm,
            TextureFormatId::R8Uint,
            TextureFormatId::Rg8Uint,
            TextureFormatId::Rgba8Uint,
            TextureFormatId::R8Sint,
            TextureFormatId::Rg8Sint,
            TextureFormatId::Rgba8Sint,
            TextureFormatId::R16,
            TextureFormatId::Rg16,
            TextureFormatId::Rgba16,
            TextureFormatId::R16Float,
            TextureFormatId::Rg16Float,
            TextureFormatId::Rgba16Float,
            TextureFormatId::R32Float,
            TextureFormatId::Rg32Float,
            TextureFormatId::Rgba32Float,
            TextureFormatId::R32Uint,
            TextureFormatId::Rg32Uint,
            TextureFormatId::Rgba32Uint,
            TextureFormatId::R32Sint,
            TextureFormatId::Rg32Sint,
            TextureFormatId::Rgba32Sint,
        ];

        match value {
            0 => Ok(None),
            v if (v as usize) <= TABLE.len() => Ok(Some(TABLE[v as usize - 1])),
            _ => Err(Error::InvalidInput("unknown texture format id")),
        }
    }

    /// The texel interpretation this format maps to.
    pub fn texel(self) -> TexelFormat {
        use TexturePrimitive::{Float, SInt, SNorm, UInt, UNorm};

        let (primitive, components) = match self {
            Self::R8 | Self::R16 => (UNorm, 1),
            Self::Rg8 | Self::Rg16 => (UNorm, 2),
            Self::Rgba8 | Self::Rgba16 => (UNorm, 4),
            Self::R8Snorm => (SNorm, 1),
            Self::Rg8Snorm => (SNorm, 2),
            Self::Rgba8Snorm => (SNorm, 4),
            Self::R8Uint | Self::R32Uint => (UInt, 1),
            Self::Rg8Uint | Self::Rg32Uint => (UInt, 2),
            Self::Rgba8Uint | Self::Rgba32Uint => (UInt, 4),
            Self::R8Sint | Self::R32Sint => (SInt, 1),
            Self::Rg8Sint | Self::Rg32Sint => (SInt, 2),
            Self::Rgba8Sint | Self::Rgba32Sint => (SInt, 4),
            Self::R16Float | Self::R32Float => (Float, 1),
            Self::Rg16Float | Self::Rg32Float => (Float, 2),
            Self::Rgba16Float | Self::Rgba32Float => (Float, 4),
        };

        TexelFormat {
            primitive,
            components,
        }
    }
}

const TYPE_MASK: u8 = 0x0F;
const FLAG_IS_ARRAY: u8 = 1 << 4;
const FLAG_IS_COMBINED_SAMPLER: u8 = 1 << 5;
const FLAG_IS_WRITE: u8 = 1 << 6;

const BASE_SAMPLER: u8 = 0;
const BASE_SAMPLER_COMPARISON: u8 = 1;
const BASE_BUFFER_START: u8 = 2;
const BASE_BUFFER_END: u8 = 8;
const BASE_TEXTURE_START: u8 = 9;
const BASE_SUBPASS_INPUT: u8 = 14;

/// Shape and per-variant payload of a register.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Sampler {
        comparison: bool,
    },
    Buffer {
        kind: BufferKind,
        write: bool,
    },
    Texture {
        ty: TextureType,
        layered: bool,
        combined_sampler: bool,
        write: bool,
        texel: Option<TexelFormat>,
        format: Option<TextureFormatId>,
    },
    SubpassInput {
        attachment: u16,
    },
}

impl RegisterKind {
    /// Packed type byte of the on-disk register record.
    pub(crate) fn type_byte(&self) -> u8 {
        match self {
            Self::Sampler { comparison } => {
                if *comparison {
                    BASE_SAMPLER_COMPARISON
                } else {
                    BASE_SAMPLER
                }
            }
            Self::Buffer { kind, write } => {
                (BASE_BUFFER_START + *kind as u8) | if *write { FLAG_IS_WRITE } else { 0 }
            }
            Self::Texture {
                ty,
                layered,
                combined_sampler,
                write,
                ..
            } => {
                (BASE_TEXTURE_START + *ty as u8)
                    | if *layered { FLAG_IS_ARRAY } else { 0 }
                    | if *combined_sampler { FLAG_IS_COMBINED_SAMPLER } else { 0 }
                    | if *write { FLAG_IS_WRITE } else { 0 }
            }
            Self::SubpassInput { .. } => BASE_SUBPASS_INPUT,
        }
    }

    /// Payload word of the on-disk register record. Buffer registers return
    /// zero; the codec patches their shader buffer id in on write.
    pub(crate) fn payload(&self) -> u16 {
        match self {
            Self::Sampler { .. } | Self::Buffer { .. } => 0,
            Self::Texture { texel, format, .. } => {
                TexelFormat::to_byte(*texel) as u16
                    | (format.map(|f| f as u8).unwrap_or(0) as u16) << 8
            }
            Self::SubpassInput { attachment } => *attachment,
        }
    }

    pub(crate) fn from_type_byte(byte: u8, payload: u16) -> Result<Self, Error> {
        if byte & 0x80 != 0 {
            return Err(Error::InvalidInput("reserved register type bit set"));
        }

        let base = byte & TYPE_MASK;
        let flags = byte & !TYPE_MASK;

        match base {
            BASE_SAMPLER | BASE_SAMPLER_COMPARISON => {
                if flags != 0 || payload != 0 {
                    return Err(Error::InvalidInput("sampler register carries flags or payload"));
                }

                Ok(Self::Sampler {
                    comparison: base == BASE_SAMPLER_COMPARISON,
                })
            }
            BASE_BUFFER_START..=BASE_BUFFER_END => {
                if flags & !FLAG_IS_WRITE != 0 {
                    return Err(Error::InvalidInput(
                        "buffer register carries texture only flags",
                    ));
                }

                let kind = match base - BASE_BUFFER_START {
                    0 => BufferKind::Constant,
                    1 => BufferKind::ByteAddress,
                    2 => BufferKind::Structured,
                    3 => BufferKind::StructuredAtomic,
                    4 => BufferKind::Storage,
                    5 => BufferKind::StorageAtomic,
                    _ => BufferKind::AccelerationStructure,
                };

                Ok(Self::Buffer {
                    kind,
                    write: flags & FLAG_IS_WRITE != 0,
                })
            }
            BASE_SUBPASS_INPUT => {
                if flags != 0 {
                    return Err(Error::InvalidInput("subpass input register carries flags"));
                }

                if payload >= 7 {
                    return Err(Error::InvalidInput("subpass input attachment id above 6"));
                }

                Ok(Self::SubpassInput {
                    attachment: payload,
                })
            }
            _ => {
                let ty = match base - BASE_TEXTURE_START {
                    0 => TextureType::D1,
                    1 => TextureType::D2,
                    2 => TextureType::D3,
                    3 => TextureType::Cube,
                    4 => TextureType::D2Ms,
                    _ => return Err(Error::InvalidInput("unknown register type")),
                };

                let write = flags & FLAG_IS_WRITE != 0;
                let combined_sampler = flags & FLAG_IS_COMBINED_SAMPLER != 0;

                if write && combined_sampler {
                    return Err(Error::InvalidInput(
                        "writable texture register with combined sampler",
                    ));
                }

                Ok(Self::Texture {
                    ty,
                    layered: flags & FLAG_IS_ARRAY != 0,
                    combined_sampler,
                    write,
                    texel: TexelFormat::from_byte(payload as u8)?,
                    format: TextureFormatId::from_u8((payload >> 8) as u8)?,
                })
            }
        }
    }

    pub const fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer { .. })
    }

    /// DXIL register letter class: t (read), u (write), s (sampler),
    /// b (constant buffer). Bindings only collide within a class.
    pub(crate) fn dxil_register_class(&self) -> u8 {
        match self {
            Self::Sampler { .. } => 2,
            Self::Buffer {
                kind: BufferKind::Constant,
                ..
            } => 3,
            Self::Buffer { write, .. } => *write as u8,
            Self::Texture { write, .. } => *write as u8,
            Self::SubpassInput { .. } => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShRegister {
    pub bindings: ShBindings,
    pub kind: RegisterKind,
    pub used: UsageFlags,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShRegisterRuntime {
    pub register: ShRegister,
    pub name: String,
    pub arrays: Vec<u32>,
    pub shader_buffer: Option<SbFile>,
    /// Identity hash; equal hashes mean identical registers, not merely
    /// compatible ones.
    pub hash: u64,
}

/// FNV-1a-64 identity hash over the packed register words, its name, its
/// array dimensions and (as the seed) the shader buffer hash.
pub fn register_hash(
    register: &ShRegister,
    name: &str,
    arrays: &[u32],
    shader_buffer: Option<&SbFile>,
) -> u64 {
    let mut hasher = match shader_buffer {
        Some(sb) => FnvHasher::with_key(sb.hash),
        None => FnvHasher::default(),
    };

    hasher.write_u64(register.bindings.get(BinaryType::Spirv).as_u64());
    hasher.write_u64(register.bindings.get(BinaryType::Dxil).as_u64());
    hasher.write_u64(
        register.kind.type_byte() as u64
            | (register.used.bits() as u64) << 8
            | (register.kind.payload() as u64) << 16,
    );

    hasher.write_u64(name.len() as u64 | (arrays.len() as u64) << 32);
    hasher.write(name.as_bytes());

    for pair in arrays.chunks(2) {
        match *pair {
            [a, b] => hasher.write_u64(a as u64 | (b as u64) << 32),
            [a] => hasher.write_u64(a as u64),
            _ => unreachable!(),
        }
    }

    hasher.finish()
}

/// Register set of one binary. Maintains name, binding and hash uniqueness
/// across insertions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registers(Vec<ShRegisterRuntime>);

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<ShRegisterRuntime> {
        self.0
    }

    fn detect_duplicate(
        &self,
        name: &str,
        bindings: ShBindings,
        kind: &RegisterKind,
    ) -> Result<(), Error> {
        if !bindings.any_set() {
            return Err(Error::InvariantViolation(
                "register requires at least one backend binding",
            ));
        }

        let spirv = bindings.get(BinaryType::Spirv);
        let dxil = bindings.get(BinaryType::Dxil);
        let class = kind.dxil_register_class();

        for reg in &self.0 {
            if reg.name == name {
                return Err(Error::AlreadyDefined("register name within binary"));
            }

            if spirv.is_set() && reg.register.bindings.get(BinaryType::Spirv) == spirv {
                return Err(Error::Incompatible(
                    "SPIRV space and binding already taken within binary",
                ));
            }

            if dxil.is_set()
                && reg.register.kind.dxil_register_class() == class
                && reg.register.bindings.get(BinaryType::Dxil) == dxil
            {
                return Err(Error::Incompatible(
                    "DXIL register and space already taken within binary",
                ));
            }
        }

        Ok(())
    }

    fn add_base(
        &mut self,
        name: String,
        arrays: Option<Vec<u32>>,
        register: ShRegister,
        shader_buffer: Option<SbFile>,
    ) -> Result<(), Error> {
        let arrays = arrays.unwrap_or_default();
        let hash = register_hash(&register, &name, &arrays, shader_buffer.as_ref());

        // A register may be reported once per entrypoint; identical repeats
        // are fine.
        if self.0.iter().any(|r| r.hash == hash) {
            return Ok(());
        }

        if name.is_empty() {
            return Err(Error::InvariantViolation("register name is required"));
        }

        if !arrays.is_empty() && arrays.len() > 32 {
            return Err(Error::InvariantViolation(
                "register array dimensions must be in [1, 32]",
            ));
        }

        self.detect_duplicate(&name, register.bindings, &register.kind)?;

        if self.0.len() >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("register table is limited to 16 bit"));
        }

        self.0.push(ShRegisterRuntime {
            register,
            name,
            arrays,
            shader_buffer,
            hash,
        });

        Ok(())
    }

    pub fn add_sampler(
        &mut self,
        used: UsageFlags,
        comparison: bool,
        name: String,
        arrays: Option<Vec<u32>>,
        bindings: ShBindings,
    ) -> Result<(), Error> {
        self.add_base(
            name,
            arrays,
            ShRegister {
                bindings,
                kind: RegisterKind::Sampler { comparison },
                used,
            },
            None,
        )
    }

    pub fn add_buffer(
        &mut self,
        kind: BufferKind,
        write: bool,
        used: UsageFlags,
        name: String,
        arrays: Option<Vec<u32>>,
        shader_buffer: Option<SbFile>,
        bindings: ShBindings,
    ) -> Result<(), Error> {
        let is_constant = kind == BufferKind::Constant;

        if !kind.has_layout() {
            if shader_buffer.is_some() {
                return Err(Error::InvariantViolation(
                    "acceleration structures and byte address buffers carry no layout",
                ));
            }
        } else {
            let sb = shader_buffer
                .as_ref()
                .ok_or(Error::InvariantViolation("buffer register requires a layout"))?;

            if sb.buffer_size == 0 {
                return Err(Error::InvariantViolation("buffer layout is empty"));
            }

            if sb.flags.contains(SbFlags::IS_TIGHTLY_PACKED) == is_constant {
                return Err(Error::InvariantViolation(
                    "constant buffers are padded, every other buffer is tightly packed",
                ));
            }

            if is_constant && sb.buffer_size >= 64 * 1024 {
                return Err(Error::CapacityExceeded("constant buffer above 64KiB"));
            }
        }

        match kind {
            BufferKind::StructuredAtomic | BufferKind::StorageAtomic => {
                if !write {
                    return Err(Error::InvariantViolation(
                        "atomic counter buffers are always writable",
                    ));
                }
            }
            BufferKind::Constant | BufferKind::AccelerationStructure => {
                if write {
                    return Err(Error::InvariantViolation(
                        "constant buffers and acceleration structures are read only",
                    ));
                }
            }
            _ => {}
        }

        self.add_base(
            name,
            arrays,
            ShRegister {
                bindings,
                kind: RegisterKind::Buffer { kind, write },
                used,
            },
            shader_buffer,
        )
    }

    pub fn add_texture(
        &mut self,
        ty: TextureType,
        layered: bool,
        combined_sampler: bool,
        used: UsageFlags,
        texel: Option<TexelFormat>,
        name: String,
        arrays: Option<Vec<u32>>,
        bindings: ShBindings,
    ) -> Result<(), Error> {
        self.add_texture_base(
            ty,
            layered,
            combined_sampler,
            false,
            used,
            texel,
            None,
            name,
            arrays,
            bindings,
        )
    }

    pub fn add_rw_texture(
        &mut self,
        ty: TextureType,
        layered: bool,
        used: UsageFlags,
        texel: Option<TexelFormat>,
        format: Option<TextureFormatId>,
        name: String,
        arrays: Option<Vec<u32>>,
        bindings: ShBindings,
    ) -> Result<(), Error> {
        self.add_texture_base(
            ty, layered, false, true, used, texel, format, name, arrays, bindings,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn add_texture_base(
        &mut self,
        ty: TextureType,
        layered: bool,
        combined_sampler: bool,
        write: bool,
        used: UsageFlags,
        texel: Option<TexelFormat>,
        format: Option<TextureFormatId>,
        name: String,
        arrays: Option<Vec<u32>>,
        bindings: ShBindings,
    ) -> Result<(), Error> {
        if write && texel.is_none() && format.is_none() {
            return Err(Error::InvariantViolation(
                "writable textures declare a texel primitive or a format",
            ));
        }

        if let Some(format) = format {
            let derived = format.texel();

            if let Some(texel) = texel {
                if texel != derived {
                    return Err(Error::Incompatible("texel primitive does not match format"));
                }
            }
        }

        if let Some(texel) = texel {
            if texel.components == 0 || texel.components > 4 {
                return Err(Error::InvariantViolation("texel component count out of range"));
            }
        }

        self.add_base(
            name,
            arrays,
            ShRegister {
                bindings,
                kind: RegisterKind::Texture {
                    ty,
                    layered,
                    combined_sampler,
                    write,
                    texel,
                    format,
                },
                used,
            },
            None,
        )
    }

    pub fn add_subpass_input(
        &mut self,
        used: UsageFlags,
        name: String,
        bindings: ShBindings,
        attachment: u16,
    ) -> Result<(), Error> {
        if attachment >= 7 {
            return Err(Error::InvariantViolation("subpass input attachment id above 6"));
        }

        if bindings.get(BinaryType::Dxil).is_set() {
            return Err(Error::InvariantViolation(
                "subpass inputs only exist for SPIRV",
            ));
        }

        self.add_base(
            name,
            None,
            ShRegister {
                bindings,
                kind: RegisterKind::SubpassInput { attachment },
                used,
            },
            None,
        )
    }

    /// Adds a register of any kind, dispatching to the typed paths so every
    /// kind specific rule applies.
    pub fn add_register(
        &mut self,
        name: String,
        arrays: Option<Vec<u32>>,
        register: ShRegister,
        shader_buffer: Option<SbFile>,
    ) -> Result<(), Error> {
        match register.kind {
            RegisterKind::Sampler { comparison } => {
                if shader_buffer.is_some() {
                    return Err(Error::InvariantViolation("samplers carry no layout"));
                }

                self.add_sampler(register.used, comparison, name, arrays, register.bindings)
            }
            RegisterKind::Buffer { kind, write } => self.add_buffer(
                kind,
                write,
                register.used,
                name,
                arrays,
                shader_buffer,
                register.bindings,
            ),
            RegisterKind::Texture {
                ty,
                layered,
                combined_sampler,
                write,
                texel,
                format,
            } => {
                if shader_buffer.is_some() {
                    return Err(Error::InvariantViolation("textures carry no layout"));
                }

                if !write && format.is_some() {
                    return Err(Error::InvariantViolation(
                        "texture formats only exist on writable textures",
                    ));
                }

                self.add_texture_base(
                    ty,
                    layered,
                    combined_sampler,
                    write,
                    register.used,
                    texel,
                    format,
                    name,
                    arrays,
                    register.bindings,
                )
            }
            RegisterKind::SubpassInput { attachment } => {
                if shader_buffer.is_some() || arrays.is_some() {
                    return Err(Error::InvariantViolation(
                        "subpass inputs carry no layout or arrays",
                    ));
                }

                self.add_subpass_input(register.used, name, register.bindings, attachment)
            }
        }
    }
}

impl Deref for Registers {
    type Target = [ShRegisterRuntime];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Registers {
    type Item = &'a ShRegisterRuntime;
    type IntoIter = core::slice::Iter<'a, ShRegisterRuntime>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

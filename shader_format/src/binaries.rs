//! Compiled binaries and their identifiers.
//!
//! A binary identifier is the uniqueness key of one compiled artifact:
//! entrypoint, stage, extension set, shader model and the uniform key/value
//! list it was compiled with. Two binaries with equal identifiers are the
//! same build.

use bitflags::bitflags;

use crate::entries::PipelineStage;
use crate::registers::{Registers, BINARY_TYPE_COUNT};

bitflags! {
    /// Optional language/device features a binary was compiled with.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ShExtensions: u32 {
        const F64 = 1 << 0;
        const I64 = 1 << 1;
        /// I16 and F16.
        const TYPES_16BIT = 1 << 2;
        const ATOMIC_I64 = 1 << 3;
        const ATOMIC_F32 = 1 << 4;
        const ATOMIC_F64 = 1 << 5;
        const SUBGROUP_ARITHMETIC = 1 << 6;
        const SUBGROUP_SHUFFLE = 1 << 7;
        const RAY_QUERY = 1 << 8;
        const RAY_MICROMAP_OPACITY = 1 << 9;
        const RAY_MICROMAP_DISPLACEMENT = 1 << 10;
        const RAY_MOTION_BLUR = 1 << 11;
        const RAY_REORDER = 1 << 12;
        const MULTIVIEW = 1 << 13;
        const COMPUTE_DERIV = 1 << 14;
        /// Payload access qualifiers.
        const PAQ = 1 << 15;
        const MESH_TASK_TEX_DERIV = 1 << 16;
        const WRITE_MS_TEXTURE = 1 << 17;
        /// Set automatically when a binary exceeds the legacy binding budget
        /// or declares an unbounded array.
        const BINDLESS = 1 << 18;
        const UNBOUND_ARRAY_SIZE = 1 << 19;
        const SUBGROUP_OPERATIONS = 1 << 20;

        /// Extensions detectable from DXIL natively.
        const DXIL_NATIVE = Self::RAY_QUERY.bits()
            | Self::TYPES_16BIT.bits()
            | Self::I64.bits()
            | Self::MULTIVIEW.bits()
            | Self::F64.bits()
            | Self::ATOMIC_I64.bits()
            | Self::MESH_TASK_TEX_DERIV.bits()
            | Self::WRITE_MS_TEXTURE.bits()
            | Self::SUBGROUP_OPERATIONS.bits();

        /// Extensions that map directly to SPIR-V capabilities.
        const SPIRV_NATIVE = Self::RAY_MICROMAP_OPACITY.bits()
            | Self::RAY_QUERY.bits()
            | Self::RAY_MOTION_BLUR.bits()
            | Self::RAY_REORDER.bits()
            | Self::ATOMIC_F32.bits()
            | Self::ATOMIC_F64.bits()
            | Self::SUBGROUP_ARITHMETIC.bits()
            | Self::SUBGROUP_SHUFFLE.bits()
            | Self::SUBGROUP_OPERATIONS.bits()
            | Self::MULTIVIEW.bits()
            | Self::TYPES_16BIT.bits()
            | Self::F64.bits()
            | Self::I64.bits()
            | Self::ATOMIC_I64.bits()
            | Self::COMPUTE_DERIV.bits()
            | Self::WRITE_MS_TEXTURE.bits();
    }
}

pub const EXTENSION_COUNT: usize = 21;

/// Display names, one per extension bit.
pub const EXTENSION_NAMES: [&str; EXTENSION_COUNT] = [
    "F64",
    "I64",
    "16BitTypes",
    "AtomicI64",
    "AtomicF32",
    "AtomicF64",
    "SubgroupArithmetic",
    "SubgroupShuffle",
    "RayQuery",
    "RayMicromapOpacity",
    "RayMicromapDisplacement",
    "RayMotionBlur",
    "RayReorder",
    "Multiview",
    "ComputeDeriv",
    "PAQ",
    "MeshTaskTexDeriv",
    "WriteMSTexture",
    "Bindless",
    "UnboundArraySize",
    "SubgroupOperations",
];

/// Preprocessor define spellings, one per extension bit.
pub const EXTENSION_DEFINES: [&str; EXTENSION_COUNT] = [
    "F64",
    "I64",
    "16BITTYPES",
    "ATOMICI64",
    "ATOMICF32",
    "ATOMICF64",
    "SUBGROUPARITHMETIC",
    "SUBGROUPSHUFFLE",
    "RAYQUERY",
    "RAYMICROMAPOPACITY",
    "RAYMICROMAPDISPLACEMENT",
    "RAYMOTIONBLUR",
    "RAYREORDER",
    "MULTIVIEW",
    "COMPUTEDERIV",
    "PAQ",
    "MESHTASKTEXDERIV",
    "WRITEMSTEXTURE",
    "BINDLESS",
    "UNBOUNDARRAYSIZE",
    "SUBGROUPOPERATIONS",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Vendor {
    Nv = 0,
    Amd = 1,
    Arm = 2,
    Qcom = 3,
    Intc = 4,
    Imgt = 5,
    Msft = 6,
}

pub const VENDOR_COUNT: usize = 7;

/// Mask with every defined vendor bit set.
pub const VENDOR_ALL: u16 = (1 << VENDOR_COUNT as u16) - 1;

pub const VENDOR_NAMES: [&str; VENDOR_COUNT] = ["NV", "AMD", "ARM", "QCOM", "INTC", "IMGT", "MSFT"];

/// Packs a shader model as major in the high byte, minor in the low byte.
pub const fn shader_model(major: u8, minor: u8) -> u16 {
    minor as u16 | (major as u16) << 8
}

pub const SHADER_MODEL_MIN: u16 = shader_model(6, 5);
pub const SHADER_MODEL_MAX: u16 = shader_model(6, 8);

/// Uniqueness key of a compiled binary.
///
/// Equality is exact: uniforms compare element-wise and case-sensitively,
/// and a differing extension set (including the automatically derived
/// `BINDLESS` bit) makes a different binary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BinaryIdentifier {
    /// `None` for library binaries compiled from a `[shader("...")]`
    /// annotation.
    pub entrypoint: Option<String>,
    pub uniforms: Vec<(String, String)>,
    pub extensions: ShExtensions,
    pub shader_version: u16,
    pub stage: PipelineStage,
}

impl BinaryIdentifier {
    pub fn shader_model_major(&self) -> u8 {
        (self.shader_version >> 8) as u8
    }

    pub fn shader_model_minor(&self) -> u8 {
        self.shader_version as u8
    }
}

/// One compiled artifact: identifier, reflection and up to one bytecode blob
/// per backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryInfo {
    pub identifier: BinaryIdentifier,
    pub registers: Registers,
    /// Extensions declared by the identifier but not detected in the final
    /// executable. The identifier keeps them so permutations stay
    /// addressable; the runtime may skip the feature checks.
    pub dormant_extensions: ShExtensions,
    /// Bitset over [`Vendor`].
    pub vendor_mask: u16,
    pub has_shader_annotation: bool,
    pub binaries: [Vec<u8>; BINARY_TYPE_COUNT],
}

impl BinaryInfo {
    pub fn new(identifier: BinaryIdentifier, vendor_mask: u16) -> Self {
        Self {
            has_shader_annotation: identifier.entrypoint.is_none(),
            identifier,
            registers: Registers::new(),
            dormant_extensions: ShExtensions::empty(),
            vendor_mask,
            binaries: Default::default(),
        }
    }

    pub fn blob(&self, binary_type: crate::registers::BinaryType) -> &[u8] {
        &self.binaries[binary_type as usize]
    }

    pub fn has_blob(&self, binary_type: crate::registers::BinaryType) -> bool {
        !self.binaries[binary_type as usize].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{shader_model, BinaryIdentifier, ShExtensions, EXTENSION_COUNT};
    use crate::entries::PipelineStage;

    fn identifier() -> BinaryIdentifier {
        BinaryIdentifier {
            entrypoint: Some("main".to_string()),
            uniforms: vec![("QUALITY".to_string(), "1".to_string())],
            extensions: ShExtensions::F64,
            shader_version: shader_model(6, 5),
            stage: PipelineStage::Compute,
        }
    }

    #[test]
    fn test_extension_bits() {
        assert_eq!(ShExtensions::all().bits(), (1 << EXTENSION_COUNT) - 1);
        assert!(ShExtensions::DXIL_NATIVE.contains(ShExtensions::RAY_QUERY));
        assert!(!ShExtensions::SPIRV_NATIVE.contains(ShExtensions::PAQ));
    }

    #[test]
    fn test_identifier_equality_is_exact() {
        let a = identifier();

        let mut b = a.clone();
        assert_eq!(a, b);

        b.uniforms[0].1 = "2".to_string();
        assert_ne!(a, b);

        let mut c = a.clone();
        c.uniforms[0].0 = "quality".to_string();
        assert_ne!(a, c);

        let mut d = a.clone();
        d.extensions |= ShExtensions::BINDLESS;
        assert_ne!(a, d);
    }

    #[test]
    fn test_shader_model_packing() {
        let id = identifier();
        assert_eq!(id.shader_version, 0x0605);
        assert_eq!(id.shader_model_major(), 6);
        assert_eq!(id.shader_model_minor(), 5);
    }
}

//! Entrypoints of an SH file and the permutation matrix each one was
//! compiled under.

use crate::binaries::{shader_model, BinaryIdentifier, BinaryInfo, ShExtensions};
use crate::registers::{BinaryType, Registers, BINARY_TYPE_COUNT};
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineStage {
    Vertex = 0,
    Pixel = 1,
    Compute = 2,
    Geometry = 3,
    Hull = 4,
    Domain = 5,
    Raygen = 6,
    Callable = 7,
    Miss = 8,
    ClosestHit = 9,
    AnyHit = 10,
    Intersection = 11,
    Mesh = 12,
    Task = 13,
    Workgraph = 14,
}

pub const PIPELINE_STAGE_COUNT: usize = 15;

impl PipelineStage {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        const TABLE: [PipelineStage; PIPELINE_STAGE_COUNT] = [
            PipelineStage::Vertex,
            PipelineStage::Pixel,
            PipelineStage::Compute,
            PipelineStage::Geometry,
            PipelineStage::Hull,
            PipelineStage::Domain,
            PipelineStage::Raygen,
            PipelineStage::Callable,
            PipelineStage::Miss,
            PipelineStage::ClosestHit,
            PipelineStage::AnyHit,
            PipelineStage::Intersection,
            PipelineStage::Mesh,
            PipelineStage::Task,
            PipelineStage::Workgraph,
        ];

        TABLE
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidInput("unknown pipeline stage"))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Pixel => "pixel",
            Self::Compute => "compute",
            Self::Geometry => "geometry",
            Self::Hull => "hull",
            Self::Domain => "domain",
            Self::Raygen => "raygeneration",
            Self::Callable => "callable",
            Self::Miss => "miss",
            Self::ClosestHit => "closesthit",
            Self::AnyHit => "anyhit",
            Self::Intersection => "intersection",
            Self::Mesh => "mesh",
            Self::Task => "task",
            Self::Workgraph => "node",
        }
    }

    /// Two letter compile target prefix ("vs" for vertex), "lib" where the
    /// stage only exists in library form.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Compute => "cs",
            Self::Geometry => "gs",
            Self::Hull => "hs",
            Self::Domain => "ds",
            Self::Mesh => "ms",
            Self::Task => "as",
            _ => "lib",
        }
    }

    pub const fn is_raytracing(self) -> bool {
        matches!(
            self,
            Self::Raygen
                | Self::Callable
                | Self::Miss
                | Self::ClosestHit
                | Self::AnyHit
                | Self::Intersection
        )
    }

    /// Stages that execute in workgroups and therefore require a group size.
    pub const fn has_group_size(self) -> bool {
        matches!(self, Self::Compute | Self::Workgraph | Self::Mesh | Self::Task)
    }

    /// Stages whose entry record carries the graphics I/O block.
    pub const fn has_graphics_io(self) -> bool {
        !matches!(self, Self::Compute | Self::Workgraph) && !self.is_raytracing()
    }

    pub const fn requires_payload(self) -> bool {
        matches!(
            self,
            Self::Miss | Self::ClosestHit | Self::AnyHit | Self::Intersection
        )
    }

    pub const fn requires_intersection(self) -> bool {
        matches!(self, Self::ClosestHit | Self::AnyHit | Self::Intersection)
    }
}

/// One entrypoint with the stage specific metadata the runtime validates
/// pipelines against.
///
/// `inputs`/`outputs` hold packed [`crate::sb::SbType`] codes as dense
/// prefixes; `input_semantic_names`/`output_semantic_names` hold
/// `semantic_name_id << 4 | semantic_index` per slot where name id zero is
/// the default semantic (TEXCOORD, or SV_TARGET for pixel outputs). Unique
/// semantic names are stored input names first, output names from
/// `unique_input_semantics` on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShEntry {
    pub name: String,
    pub binary_ids: Vec<u16>,
    pub stage: PipelineStage,
    pub unique_input_semantics: u8,
    /// Four packed nibbles: required, min, max, recommended wave size as
    /// log2 + 1, each in 0..=9 where 0 means unset.
    pub wave_size: u16,
    pub group: [u16; 3],
    pub intersection_size: u8,
    pub payload_size: u8,
    pub inputs: [u8; 16],
    pub outputs: [u8; 16],
    pub input_semantic_names: [u8; 16],
    pub output_semantic_names: [u8; 16],
    pub semantic_names: Vec<String>,
}

impl Default for ShEntry {
    fn default() -> Self {
        Self::new(String::new(), PipelineStage::Vertex)
    }
}

impl ShEntry {
    pub fn new(name: String, stage: PipelineStage) -> Self {
        Self {
            name,
            binary_ids: Vec::new(),
            stage,
            unique_input_semantics: 0,
            wave_size: 0,
            group: [0; 3],
            intersection_size: 0,
            payload_size: 0,
            inputs: [0; 16],
            outputs: [0; 16],
            input_semantic_names: [0; 16],
            output_semantic_names: [0; 16],
            semantic_names: Vec::new(),
        }
    }

    pub fn wave_size_nibble(&self, slot: u8) -> u8 {
        (self.wave_size >> (slot * 4) & 0xF) as u8
    }

    pub fn has_semantic_names(&self) -> bool {
        self.input_semantic_names.iter().any(|s| *s != 0)
            || self.output_semantic_names.iter().any(|s| *s != 0)
    }

    /// Length of the dense input prefix.
    pub fn input_count(&self) -> usize {
        self.inputs.iter().position(|i| *i == 0).unwrap_or(16)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.iter().position(|o| *o == 0).unwrap_or(16)
    }
}

/// An entrypoint as found in the source, before its permutations were
/// compiled: the entry itself plus everything that decides how to compile it.
///
/// The permutation matrix is the Cartesian product of `shader_versions`,
/// `extensions` and the uniform sets described by `uniforms_per_compilation`
/// (each taking that many leading pairs of `uniform_name_values`, in order).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShEntryRuntime {
    pub entry: ShEntry,
    pub vendor_mask: u16,
    /// `[shader("...")]` annotation instead of a stage attribute; the binary
    /// is a library without a named entrypoint.
    pub is_shader_annotation: bool,
    /// Set once a compile permutation has written its reflection back.
    pub is_initialized: bool,
    pub extensions: Vec<ShExtensions>,
    pub shader_versions: Vec<u16>,
    pub uniform_name_values: Vec<(String, String)>,
    pub uniforms_per_compilation: Vec<u8>,
}

impl ShEntryRuntime {
    pub fn combination_count(&self) -> u32 {
        self.shader_versions.len().max(1) as u32
            * self.extensions.len().max(1) as u32
            * self.uniforms_per_compilation.len().max(1) as u32
    }

    /// The identifier of combination `id`, decomposed column major as
    /// shader version, then extension set, then uniform set.
    ///
    /// All raytracing stages collapse onto the raygen stage so every
    /// raytracing entry of a file lands in one combined library binary per
    /// permutation.
    pub fn as_binary_identifier(&self, id: u16) -> Result<BinaryIdentifier, Error> {
        let versions = self.shader_versions.len().max(1) as u32;
        let extensions = self.extensions.len().max(1) as u32;
        let uniforms = self.uniforms_per_compilation.len().max(1) as u32;

        let mut id = id as u32;
        let version_id = id % versions;
        id /= versions;
        let extension_id = id % extensions;
        id /= extensions;
        let uniform_id = id;

        if uniform_id >= uniforms {
            return Err(Error::InvalidInput("combination id out of bounds"));
        }

        let mut stage = self.entry.stage;
        if stage.is_raytracing() {
            stage = PipelineStage::Raygen;
        }

        let mut identifier = BinaryIdentifier {
            entrypoint: if self.is_shader_annotation {
                None
            } else {
                Some(self.entry.name.clone())
            },
            uniforms: Vec::new(),
            extensions: self
                .extensions
                .get(extension_id as usize)
                .copied()
                .unwrap_or(ShExtensions::empty()),
            shader_version: self
                .shader_versions
                .get(version_id as usize)
                .copied()
                .unwrap_or(shader_model(6, 5)),
            stage,
        };

        if let Some(count) = self.uniforms_per_compilation.get(uniform_id as usize) {
            let offset: usize = self.uniforms_per_compilation[..uniform_id as usize]
                .iter()
                .map(|c| *c as usize)
                .sum();

            let pairs = self
                .uniform_name_values
                .get(offset..offset + *count as usize)
                .ok_or(Error::InvalidInput("uniform set out of bounds"))?;

            identifier.uniforms = pairs.to_vec();
        }

        Ok(identifier)
    }

    /// Binary info skeleton for one compiled permutation: the identifier
    /// plus the bytecode of `binary_type` and the extensions the backend
    /// found to be dormant.
    pub fn as_binary_info(
        &self,
        id: u16,
        binary_type: BinaryType,
        bytes: Vec<u8>,
        dormant_extensions: ShExtensions,
    ) -> Result<BinaryInfo, Error> {
        let identifier = self.as_binary_identifier(id)?;

        let mut binaries: [Vec<u8>; BINARY_TYPE_COUNT] = Default::default();
        binaries[binary_type as usize] = bytes;

        Ok(BinaryInfo {
            identifier,
            registers: Registers::new(),
            dormant_extensions,
            vendor_mask: self.vendor_mask,
            has_shader_annotation: self.is_shader_annotation,
            binaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineStage, ShEntry, ShEntryRuntime};
    use crate::binaries::{shader_model, ShExtensions};

    fn runtime() -> ShEntryRuntime {
        ShEntryRuntime {
            entry: ShEntry::new("main".to_string(), PipelineStage::Pixel),
            vendor_mask: u16::MAX,
            shader_versions: vec![shader_model(6, 5), shader_model(6, 6)],
            extensions: vec![ShExtensions::empty(), ShExtensions::F64, ShExtensions::I64],
            uniform_name_values: vec![
                ("QUALITY".to_string(), "1".to_string()),
                ("QUALITY".to_string(), "2".to_string()),
            ],
            uniforms_per_compilation: vec![1, 1],
            ..Default::default()
        }
    }

    #[test]
    fn test_combination_count() {
        let runtime = runtime();
        assert_eq!(runtime.combination_count(), 2 * 3 * 2);

        let empty = ShEntryRuntime::default();
        assert_eq!(empty.combination_count(), 1);
    }

    #[test]
    fn test_combination_decomposition() {
        let runtime = runtime();

        // Column major: shader version varies fastest, uniforms slowest.
        let id = runtime.as_binary_identifier(0).unwrap();
        assert_eq!(id.shader_version, shader_model(6, 5));
        assert_eq!(id.extensions, ShExtensions::empty());
        assert_eq!(id.uniforms[0].1, "1");

        let id = runtime.as_binary_identifier(1).unwrap();
        assert_eq!(id.shader_version, shader_model(6, 6));
        assert_eq!(id.extensions, ShExtensions::empty());

        let id = runtime.as_binary_identifier(2).unwrap();
        assert_eq!(id.shader_version, shader_model(6, 5));
        assert_eq!(id.extensions, ShExtensions::F64);

        let id = runtime.as_binary_identifier(6 + 5).unwrap();
        assert_eq!(id.shader_version, shader_model(6, 6));
        assert_eq!(id.extensions, ShExtensions::I64);
        assert_eq!(id.uniforms[0].1, "2");

        assert!(runtime.as_binary_identifier(12).is_err());
    }

    #[test]
    fn test_defaults_without_matrix() {
        let runtime = ShEntryRuntime {
            entry: ShEntry::new("main".to_string(), PipelineStage::Compute),
            ..Default::default()
        };

        let id = runtime.as_binary_identifier(0).unwrap();
        assert_eq!(id.shader_version, shader_model(6, 5));
        assert!(id.uniforms.is_empty());
    }

    #[test]
    fn test_raytracing_stage_collapse() {
        for stage in [
            PipelineStage::Raygen,
            PipelineStage::Callable,
            PipelineStage::Miss,
            PipelineStage::ClosestHit,
            PipelineStage::AnyHit,
            PipelineStage::Intersection,
        ] {
            let runtime = ShEntryRuntime {
                entry: ShEntry::new("hit".to_string(), stage),
                is_shader_annotation: true,
                ..Default::default()
            };

            let id = runtime.as_binary_identifier(0).unwrap();
            assert_eq!(id.stage, PipelineStage::Raygen);
        }
    }

    #[test]
    fn test_dense_prefix_counts() {
        let mut entry = ShEntry::new("main".to_string(), PipelineStage::Vertex);
        entry.inputs[0] = 0x16;
        entry.inputs[1] = 0x16;
        assert_eq!(entry.input_count(), 2);
        assert_eq!(entry.output_count(), 0);
    }
}

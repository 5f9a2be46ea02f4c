//! The SB container: the nested layout of a constant or structured buffer.
//!
//! An SB describes a tree of variables. Every variable has a parent (the
//! buffer root or a struct typed variable), either a primitive type or an
//! index into the struct table, a byte offset within its parent and
//! per-backend usage flags. Registers embed SB files to describe the buffers
//! they bind.

use std::hash::Hasher;

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use fnv::FnvHasher;

use crate::dl::{DlDataType, DlFile};
use crate::{is_ascii, Decode, Encode, Error};

pub const SB_MAGIC: u32 = 0x4253_696F;
pub const SB_VERSION: u8 = 0x12;

/// Primitive of an [`SbType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SbPrimitive {
    Invalid = 0,
    Float = 1,
    Int = 2,
    UInt = 3,
}

/// Scalar width of an [`SbType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SbStride {
    X8 = 0,
    X16 = 1,
    X32 = 2,
    X64 = 3,
}

impl SbStride {
    pub const fn bytes(self) -> u32 {
        1 << self as u32
    }
}

/// Packed type code of a shader variable or a graphics I/O slot.
///
/// Bits 0..2 primitive, 2..4 stride, 4..6 vector length - 1,
/// 6..8 matrix column count - 1. The zero byte doubles as "no type" in the
/// dense I/O arrays of an entrypoint, which works out because a valid type
/// never has an `Invalid` primitive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SbType(pub u8);

impl SbType {
    pub const F32: Self = Self::new(SbPrimitive::Float, SbStride::X32, 1, 1);
    pub const F32X2: Self = Self::new(SbPrimitive::Float, SbStride::X32, 2, 1);
    pub const F32X3: Self = Self::new(SbPrimitive::Float, SbStride::X32, 3, 1);
    pub const F32X4: Self = Self::new(SbPrimitive::Float, SbStride::X32, 4, 1);
    pub const F32X4X4: Self = Self::new(SbPrimitive::Float, SbStride::X32, 4, 4);
    pub const I32: Self = Self::new(SbPrimitive::Int, SbStride::X32, 1, 1);
    pub const U32: Self = Self::new(SbPrimitive::UInt, SbStride::X32, 1, 1);

    /// `vector` and `matrix` are in `1..=4`.
    pub const fn new(primitive: SbPrimitive, stride: SbStride, vector: u8, matrix: u8) -> Self {
        Self(
            primitive as u8
                | (stride as u8) << 2
                | ((vector - 1) & 3) << 4
                | ((matrix - 1) & 3) << 6,
        )
    }

    pub const fn primitive(self) -> SbPrimitive {
        match self.0 & 3 {
            1 => SbPrimitive::Float,
            2 => SbPrimitive::Int,
            3 => SbPrimitive::UInt,
            _ => SbPrimitive::Invalid,
        }
    }

    pub const fn stride(self) -> SbStride {
        match self.0 >> 2 & 3 {
            0 => SbStride::X8,
            1 => SbStride::X16,
            2 => SbStride::X32,
            _ => SbStride::X64,
        }
    }

    pub const fn vector(self) -> u8 {
        (self.0 >> 4 & 3) + 1
    }

    pub const fn matrix(self) -> u8 {
        (self.0 >> 6 & 3) + 1
    }

    pub const fn is_valid(self) -> bool {
        !matches!(self.primitive(), SbPrimitive::Invalid)
    }

    /// Tightly packed byte size.
    pub const fn size(self) -> u32 {
        self.stride().bytes() * self.vector() as u32 * self.matrix() as u32
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SbFlags: u32 {
        const HIDE_MAGIC_NUMBER = 1 << 0;
        /// Scalar packing (structured/storage buffers). Cleared for the
        /// 16-byte aligned constant buffer layout.
        const IS_TIGHTLY_PACKED = 1 << 1;
    }
}

bitflags! {
    /// Per-backend usage of a single variable.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SbVarFlags: u8 {
        const USED_SPIRV = 1 << 0;
        const USED_DXIL = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SbStruct {
    pub stride: u32,
}

/// Sentinel parent id for variables attached to the buffer root.
pub const SB_ROOT: u16 = u16::MAX;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SbVar {
    pub parent_id: u16,
    /// `u16::MAX` when the variable is a primitive; `ty` holds the type.
    pub struct_id: u16,
    pub ty: SbType,
    pub flags: SbVarFlags,
    pub offset: u32,
    /// Index into the array table, `u16::MAX` when not an array.
    pub array_id: u16,
}

/// Type of a variable added through [`SbFile::add_variable`].
#[derive(Copy, Clone, Debug)]
pub enum SbVarKind {
    Primitive(SbType),
    Struct(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SbFile {
    pub structs: Vec<SbStruct>,
    pub vars: Vec<SbVar>,
    pub struct_names: Vec<String>,
    pub var_names: Vec<String>,
    pub arrays: Vec<Vec<u32>>,
    pub flags: SbFlags,
    pub buffer_size: u32,
    /// Content hash, updated incrementally by the builder calls. Two SB
    /// files with equal hash carry identical content.
    pub hash: u64,
}

impl SbFile {
    pub fn new(flags: SbFlags, buffer_size: u32) -> Result<Self, Error> {
        if buffer_size == 0 {
            return Err(Error::InvariantViolation("SB buffer size is required"));
        }

        // The magic visibility is a serialization detail and stays out of
        // the content hash.
        let mut hasher = FnvHasher::default();
        hasher.write_u64(
            (flags & SbFlags::IS_TIGHTLY_PACKED).bits() as u64 | (buffer_size as u64) << 32,
        );

        Ok(Self {
            structs: Vec::new(),
            vars: Vec::new(),
            struct_names: Vec::new(),
            var_names: Vec::new(),
            arrays: Vec::new(),
            flags,
            buffer_size,
            hash: hasher.finish(),
        })
    }

    pub fn is_tightly_packed(&self) -> bool {
        self.flags.contains(SbFlags::IS_TIGHTLY_PACKED)
    }

    pub fn add_struct(&mut self, name: &str, stride: u32) -> Result<u16, Error> {
        if name.is_empty() {
            return Err(Error::InvariantViolation("SB struct name is required"));
        }

        if stride == 0 {
            return Err(Error::InvariantViolation("SB struct stride is required"));
        }

        if self.structs.len() >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("SB struct table is limited to 16 bit"));
        }

        let mut hasher = FnvHasher::with_key(self.hash);
        hasher.write_u64(stride as u64 | (name.len() as u64) << 32);
        hasher.write(name.as_bytes());
        self.hash = hasher.finish();

        self.structs.push(SbStruct { stride });
        self.struct_names.push(name.to_string());
        Ok(self.structs.len() as u16 - 1)
    }

    pub fn add_variable(
        &mut self,
        name: &str,
        offset: u32,
        parent_id: u16,
        kind: SbVarKind,
        flags: SbVarFlags,
        arrays: Option<Vec<u32>>,
    ) -> Result<u16, Error> {
        if name.is_empty() {
            return Err(Error::InvariantViolation("SB variable name is required"));
        }

        if self.vars.len() >= u16::MAX as usize {
            return Err(Error::CapacityExceeded("SB variable table is limited to 16 bit"));
        }

        let bound = if parent_id == SB_ROOT {
            self.buffer_size
        } else {
            let parent = self
                .vars
                .get(parent_id as usize)
                .ok_or(Error::InvariantViolation("SB variable parent does not exist"))?;

            if parent.struct_id == u16::MAX {
                return Err(Error::InvariantViolation(
                    "SB variable parent is not a struct variable",
                ));
            }

            self.structs[parent.struct_id as usize].stride
        };

        for (var, var_name) in self.vars.iter().zip(&self.var_names) {
            if var.parent_id == parent_id && var_name == name {
                return Err(Error::AlreadyDefined("SB variable name within parent"));
            }
        }

        let (struct_id, ty, elem_size) = match kind {
            SbVarKind::Primitive(ty) => {
                if !ty.is_valid() {
                    return Err(Error::InvariantViolation("SB variable type is invalid"));
                }

                (u16::MAX, ty, ty.size())
            }
            SbVarKind::Struct(id) => {
                let strct = self
                    .structs
                    .get(id as usize)
                    .ok_or(Error::InvariantViolation("SB variable struct does not exist"))?;

                (id, SbType::default(), strct.stride)
            }
        };

        let mut array_len = 1u64;

        if let Some(dims) = &arrays {
            if dims.is_empty() || dims.len() > 32 {
                return Err(Error::InvariantViolation(
                    "SB variable array dimensions must be in [1, 32]",
                ));
            }

            if dims.iter().any(|d| *d == 0) {
                return Err(Error::InvariantViolation("SB variable array dimension is zero"));
            }

            for dim in dims {
                array_len *= *dim as u64;
            }
        }

        // Tight size never exceeds the padded size, so this bound holds for
        // both packing modes.
        if offset as u64 + elem_size as u64 * array_len > bound as u64 {
            return Err(Error::InvariantViolation("SB variable exceeds parent bounds"));
        }

        let array_id = match arrays {
            None => u16::MAX,
            Some(dims) => match self.arrays.iter().position(|a| *a == dims) {
                Some(i) => i as u16,
                None => {
                    if self.arrays.len() >= u16::MAX as usize {
                        return Err(Error::CapacityExceeded("SB array table is limited to 16 bit"));
                    }

                    self.arrays.push(dims);
                    self.arrays.len() as u16 - 1
                }
            },
        };

        let var = SbVar {
            parent_id,
            struct_id,
            ty,
            flags,
            offset,
            array_id,
        };

        let mut hasher = FnvHasher::with_key(self.hash);
        hasher.write_u64(
            var.parent_id as u64
                | (var.struct_id as u64) << 16
                | (var.ty.0 as u64) << 32
                | (var.flags.bits() as u64) << 40,
        );
        hasher.write_u64(var.offset as u64 | (name.len() as u64) << 32);
        hasher.write(name.as_bytes());

        if var.array_id != u16::MAX {
            for dim in &self.arrays[var.array_id as usize] {
                hasher.write_u64(*dim as u64);
            }
        }

        self.hash = hasher.finish();

        self.vars.push(var);
        self.var_names.push(name.to_string());
        Ok(self.vars.len() as u16 - 1)
    }

    /// Tightly packed byte size of a variable, arrays included.
    pub fn var_size(&self, id: u16) -> u32 {
        let var = &self.vars[id as usize];

        let elem = if var.struct_id == u16::MAX {
            var.ty.size()
        } else {
            self.structs[var.struct_id as usize].stride
        };

        let count: u32 = if var.array_id == u16::MAX {
            1
        } else {
            self.arrays[var.array_id as usize].iter().product()
        };

        elem * count
    }

    pub fn write<B>(&self, mut buf: B, hide_magic: bool)
    where
        B: BufMut,
    {
        if !hide_magic && !self.flags.contains(SbFlags::HIDE_MAGIC_NUMBER) {
            SB_MAGIC.encode(&mut buf);
        }

        SB_VERSION.encode(&mut buf);
        ((self.flags & SbFlags::IS_TIGHTLY_PACKED).bits() as u8).encode(&mut buf);
        (self.structs.len() as u16).encode(&mut buf);
        (self.vars.len() as u16).encode(&mut buf);
        (self.arrays.len() as u16).encode(&mut buf);
        self.buffer_size.encode(&mut buf);

        let utf8 = self
            .struct_names
            .iter()
            .chain(&self.var_names)
            .any(|n| !is_ascii(n.as_bytes()));

        let mut names = DlFile::new(
            if utf8 { DlDataType::Utf8 } else { DlDataType::Ascii },
            true,
        );

        for name in self.struct_names.iter().chain(&self.var_names) {
            names
                .push_string(name)
                .expect("names were validated on insert");
        }

        names.write(&mut buf);

        for strct in &self.structs {
            strct.stride.encode(&mut buf);
        }

        for var in &self.vars {
            var.parent_id.encode(&mut buf);
            var.struct_id.encode(&mut buf);
            var.ty.0.encode(&mut buf);
            var.flags.bits().encode(&mut buf);
            var.offset.encode(&mut buf);
            var.array_id.encode(&mut buf);
        }

        for array in &self.arrays {
            (array.len() as u8).encode(&mut buf);
        }

        for array in &self.arrays {
            for dim in array {
                dim.encode(&mut buf);
            }
        }
    }

    /// Reads an SB blob, revalidating it through the builder calls so the
    /// invariants and the content hash hold for the produced tree.
    pub fn read<B>(mut buf: B, is_sub_file: bool) -> Result<Self, Error>
    where
        B: Buf,
    {
        if !is_sub_file {
            let magic = u32::decode(&mut buf)?;
            if magic != SB_MAGIC {
                return Err(Error::InvalidInput("bad SB magic number"));
            }
        }

        let version = u8::decode(&mut buf)?;
        if version != SB_VERSION {
            return Err(Error::InvalidInput("unsupported SB version"));
        }

        let raw_flags = u8::decode(&mut buf)?;
        let flags = SbFlags::from_bits(raw_flags as u32)
            .ok_or(Error::InvalidInput("reserved SB flag bits set"))?;

        if flags.contains(SbFlags::HIDE_MAGIC_NUMBER) {
            return Err(Error::InvalidInput("SB hide magic flag is implied, not stored"));
        }

        let struct_count = u16::decode(&mut buf)? as usize;
        let var_count = u16::decode(&mut buf)? as usize;
        let array_count = u16::decode(&mut buf)? as usize;
        let buffer_size = u32::decode(&mut buf)?;

        let names = DlFile::read(&mut buf, true)?;
        if names.len() != struct_count + var_count {
            return Err(Error::InvalidInput("SB name pool does not match the tables"));
        }

        let mut file = Self::new(flags, buffer_size)?;

        for i in 0..struct_count {
            let stride = u32::decode(&mut buf)?;
            file.add_struct(names.string(i), stride)?;
        }

        struct RawVar {
            parent_id: u16,
            struct_id: u16,
            ty: u8,
            flags: u8,
            offset: u32,
            array_id: u16,
        }

        let mut raw_vars = Vec::with_capacity(var_count.min(1024));
        for _ in 0..var_count {
            raw_vars.push(RawVar {
                parent_id: u16::decode(&mut buf)?,
                struct_id: u16::decode(&mut buf)?,
                ty: u8::decode(&mut buf)?,
                flags: u8::decode(&mut buf)?,
                offset: u32::decode(&mut buf)?,
                array_id: u16::decode(&mut buf)?,
            });
        }

        let mut arrays = Vec::with_capacity(array_count.min(1024));
        for _ in 0..array_count {
            arrays.push(u8::decode(&mut buf)? as usize);
        }

        let arrays: Vec<Vec<u32>> = arrays
            .into_iter()
            .map(|dims| {
                (0..dims)
                    .map(|_| u32::decode(&mut buf).map_err(Error::from))
                    .collect()
            })
            .collect::<Result<_, _>>()?;

        for (i, raw) in raw_vars.iter().enumerate() {
            let kind = if raw.struct_id != u16::MAX {
                if raw.ty != 0 {
                    return Err(Error::InvalidInput("SB struct variable carries a type"));
                }

                SbVarKind::Struct(raw.struct_id)
            } else {
                SbVarKind::Primitive(SbType(raw.ty))
            };

            let flags = SbVarFlags::from_bits(raw.flags)
                .ok_or(Error::InvalidInput("reserved SB variable flag bits set"))?;

            let dims = if raw.array_id == u16::MAX {
                None
            } else {
                Some(
                    arrays
                        .get(raw.array_id as usize)
                        .ok_or(Error::InvalidInput("SB variable references a missing array"))?
                        .clone(),
                )
            };

            file.add_variable(
                names.string(struct_count + i),
                raw.offset,
                raw.parent_id,
                kind,
                flags,
                dims,
            )?;
        }

        Ok(file)
    }

    /// Merges two layouts of the same buffer seen from different binaries.
    ///
    /// Everything except the per-backend usage flags and the array shape has
    /// to match; usage is OR-ed, arrays follow the flatten rule of
    /// [`merge_array_dims`].
    pub fn combine(a: &SbFile, b: &SbFile) -> Result<SbFile, Error> {
        if a.flags != b.flags {
            return Err(Error::Incompatible("SB flags mismatch"));
        }

        if a.buffer_size != b.buffer_size {
            return Err(Error::Incompatible("SB buffer size mismatch"));
        }

        if a.structs.len() != b.structs.len() || a.vars.len() != b.vars.len() {
            return Err(Error::Incompatible("SB layout mismatch"));
        }

        let mut combined = SbFile::new(a.flags, a.buffer_size)?;

        for i in 0..a.structs.len() {
            if a.structs[i] != b.structs[i] || a.struct_names[i] != b.struct_names[i] {
                return Err(Error::Incompatible("SB struct mismatch"));
            }

            combined.add_struct(&a.struct_names[i], a.structs[i].stride)?;
        }

        for i in 0..a.vars.len() {
            let (va, vb) = (&a.vars[i], &b.vars[i]);

            if a.var_names[i] != b.var_names[i]
                || va.parent_id != vb.parent_id
                || va.struct_id != vb.struct_id
                || va.ty != vb.ty
                || va.offset != vb.offset
            {
                return Err(Error::Incompatible("SB variable mismatch"));
            }

            let empty = Vec::new();
            let dims_a = match va.array_id {
                u16::MAX => &empty,
                id => &a.arrays[id as usize],
            };
            let dims_b = match vb.array_id {
                u16::MAX => &empty,
                id => &b.arrays[id as usize],
            };

            let dims = merge_array_dims(dims_a, dims_b)?;

            let kind = if va.struct_id == u16::MAX {
                SbVarKind::Primitive(va.ty)
            } else {
                SbVarKind::Struct(va.struct_id)
            };

            combined.add_variable(
                &a.var_names[i],
                va.offset,
                va.parent_id,
                kind,
                va.flags | vb.flags,
                if dims.is_empty() { None } else { Some(dims) },
            )?;
        }

        Ok(combined)
    }
}

/// Merges two array dimension lists describing the same resource.
///
/// Equal lists merge to themselves. A one-dimensional ("flattened") list is
/// compatible with a multi-dimensional one when the products agree; the merge
/// then keeps the multi-dimensional ("unflattened") form.
pub fn merge_array_dims(a: &[u32], b: &[u32]) -> Result<Vec<u32>, Error> {
    if a.len() == 1 || b.len() == 1 {
        let product_a: u64 = a.iter().map(|d| *d as u64).product::<u64>() * a.len().min(1) as u64;
        let product_b: u64 = b.iter().map(|d| *d as u64).product::<u64>() * b.len().min(1) as u64;

        if product_a != product_b {
            return Err(Error::Incompatible("array flattened size mismatch"));
        }

        if b.len() != 1 {
            return Ok(b.to_vec());
        }

        return Ok(a.to_vec());
    }

    if a != b {
        return Err(Error::Incompatible("array dimensions mismatch"));
    }

    Ok(a.to_vec())
}

#[cfg(test)]
mod tests {
    use super::{
        merge_array_dims, SbFile, SbFlags, SbType, SbVarFlags, SbVarKind, SB_ROOT,
    };
    use crate::Error;

    fn cbuffer() -> SbFile {
        let mut sb = SbFile::new(SbFlags::empty(), 256).unwrap();
        sb.add_variable(
            "view",
            0,
            SB_ROOT,
            SbVarKind::Primitive(SbType::F32X4X4),
            SbVarFlags::USED_SPIRV,
            None,
        )
        .unwrap();
        sb.add_variable(
            "tint",
            64,
            SB_ROOT,
            SbVarKind::Primitive(SbType::F32X4),
            SbVarFlags::empty(),
            None,
        )
        .unwrap();
        sb
    }

    #[test]
    fn test_type_packing() {
        let ty = SbType::F32X4X4;
        assert_eq!(ty.vector(), 4);
        assert_eq!(ty.matrix(), 4);
        assert_eq!(ty.size(), 64);
        assert!(ty.is_valid());
        assert!(!SbType::default().is_valid());
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = cbuffer();
        let b = cbuffer();
        assert_eq!(a.hash, b.hash);

        let mut c = cbuffer();
        c.add_variable(
            "extra",
            128,
            SB_ROOT,
            SbVarKind::Primitive(SbType::U32),
            SbVarFlags::empty(),
            None,
        )
        .unwrap();
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut sb = cbuffer();
        let err = sb
            .add_variable(
                "view",
                128,
                SB_ROOT,
                SbVarKind::Primitive(SbType::F32),
                SbVarFlags::empty(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyDefined(_)));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut sb = cbuffer();
        let err = sb
            .add_variable(
                "tail",
                252,
                SB_ROOT,
                SbVarKind::Primitive(SbType::F32X2),
                SbVarFlags::empty(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_reflexive() {
        let mut sb = cbuffer();
        let strct = sb.add_struct("Light", 32).unwrap();
        sb.add_variable(
            "lights",
            128,
            SB_ROOT,
            SbVarKind::Struct(strct),
            SbVarFlags::USED_DXIL,
            Some(vec![4]),
        )
        .unwrap();

        let mut buf = Vec::new();
        sb.write(&mut buf, false);

        let read = SbFile::read(&buf[..], false).unwrap();
        assert_eq!(read, sb);
        assert_eq!(read.hash, sb.hash);

        let mut hidden = Vec::new();
        sb.write(&mut hidden, true);
        assert_eq!(hidden.len() + 4, buf.len());
        assert_eq!(SbFile::read(&hidden[..], true).unwrap().hash, sb.hash);
    }

    #[test]
    fn test_combine_ors_usage() {
        let mut a = cbuffer();
        let mut b = cbuffer();
        a.vars[1].flags = SbVarFlags::USED_SPIRV;
        b.vars[1].flags = SbVarFlags::USED_DXIL;

        let c = SbFile::combine(&a, &b).unwrap();
        assert_eq!(
            c.vars[1].flags,
            SbVarFlags::USED_SPIRV | SbVarFlags::USED_DXIL
        );
    }

    #[test]
    fn test_combine_layout_mismatch() {
        let a = cbuffer();
        let mut b = cbuffer();
        b.vars[1].offset = 80;

        assert!(matches!(
            SbFile::combine(&a, &b),
            Err(Error::Incompatible(_))
        ));
    }

    #[test]
    fn test_merge_array_dims() {
        assert_eq!(merge_array_dims(&[9], &[3, 3]).unwrap(), vec![3, 3]);
        assert_eq!(merge_array_dims(&[3, 3], &[9]).unwrap(), vec![3, 3]);
        assert_eq!(merge_array_dims(&[2, 4], &[2, 4]).unwrap(), vec![2, 4]);
        assert!(merge_array_dims(&[8], &[3, 3]).is_err());
        assert!(merge_array_dims(&[2, 4], &[4, 2]).is_err());
    }
}

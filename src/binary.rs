//! Binary object stream.
//!
//! Little-endian, no padding, no field tags. Strings and arrays carry a
//! `u32` length prefix, enums and flags their `u32` value, pointers the
//! `u32` class GUID of the pointee (0 for null) ahead of its payload, and
//! asset references their `u64` object GUID. Classes are written most-base
//! first.

use std::any::Any;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::assets::AssetRef;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::guid::{ObjectGuid, TypeGuid};
use crate::registry::Object;
use crate::types::{
    ArrayInfo, AssetRefInfo, ClassInfo, EnumInfo, MathKind, ObjectPtr, PointerInfo,
    PrimitiveKind, StructInfo, TypeDescriptor,
};
use crate::value::{MathValue, Scalar};
use crate::visitor::{
    dynamic_type, instantiate, walk, walk_class, walk_class_mut, walk_fields, walk_fields_mut,
    walk_mut, Nesting, Visitor, VisitorMut,
};

/// Longest array or string accepted from a stream.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

pub struct BinaryWriter<'a, W> {
    out: W,
    cx: Context<'a>,
    nesting: Nesting,
}

impl<'a, W: Write> BinaryWriter<'a, W> {
    pub fn new(out: W, cx: Context<'a>) -> Self {
        Self {
            out,
            cx,
            nesting: Nesting::default(),
        }
    }

    pub fn write(&mut self, ty: &TypeDescriptor, value: &dyn Any) -> Result<()> {
        walk(self, ty, value)
    }

    /// Writes the class GUID of `object` followed by its payload.
    pub fn write_object(&mut self, object: &dyn Object) -> Result<()> {
        let ty = self.cx.registry().descriptor_of(object)?;
        self.out.write_u32::<LittleEndian>(object.class_guid().0)?;
        walk(self, ty, object.as_any())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_len(&mut self, len: usize, what: &str) -> Result<()> {
        if len > MAX_ARRAY_LEN {
            return Err(Error::InvalidValue(format!(
                "{what} of length {len} exceeds {MAX_ARRAY_LEN}"
            )));
        }
        self.out.write_u32::<LittleEndian>(len as u32)?;
        Ok(())
    }
}

impl<W: Write> Visitor for BinaryWriter<'_, W> {
    type Output = ();

    fn nesting(&mut self) -> &mut Nesting {
        &mut self.nesting
    }

    fn visit_primitive(&mut self, value: Scalar) -> Result<()> {
        let out = &mut self.out;
        match value {
            Scalar::I8(v) => out.write_i8(v)?,
            Scalar::I16(v) => out.write_i16::<LittleEndian>(v)?,
            Scalar::I32(v) => out.write_i32::<LittleEndian>(v)?,
            Scalar::I64(v) => out.write_i64::<LittleEndian>(v)?,
            Scalar::U8(v) => out.write_u8(v)?,
            Scalar::U16(v) => out.write_u16::<LittleEndian>(v)?,
            Scalar::U32(v) => out.write_u32::<LittleEndian>(v)?,
            Scalar::U64(v) => out.write_u64::<LittleEndian>(v)?,
            Scalar::F32(v) => out.write_f32::<LittleEndian>(v)?,
            Scalar::F64(v) => out.write_f64::<LittleEndian>(v)?,
            Scalar::Bool(v) => out.write_u8(u8::from(v))?,
        }
        Ok(())
    }

    fn visit_math(&mut self, value: MathValue) -> Result<()> {
        for component in value.components() {
            self.out.write_f32::<LittleEndian>(component)?;
        }
        Ok(())
    }

    fn visit_string(&mut self, value: &str) -> Result<()> {
        self.write_len(value.len(), "string")?;
        self.out.write_all(value.as_bytes())?;
        Ok(())
    }

    fn visit_enum(&mut self, _info: &EnumInfo, raw: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(raw)?;
        Ok(())
    }

    fn visit_flags(&mut self, _info: &EnumInfo, raw: u32) -> Result<()> {
        self.out.write_u32::<LittleEndian>(raw)?;
        Ok(())
    }

    fn visit_struct(&mut self, info: &StructInfo, value: &dyn Any) -> Result<()> {
        walk_fields(self, &info.fields, value)
    }

    fn visit_class(&mut self, info: &ClassInfo, value: &dyn Any) -> Result<()> {
        walk_class(self, info, value)
    }

    fn visit_pointer(&mut self, info: &PointerInfo, target: Option<&dyn Object>) -> Result<()> {
        let Some(object) = target else {
            self.out.write_u32::<LittleEndian>(TypeGuid::NULL.0)?;
            return Ok(());
        };
        let ty = dynamic_type(self.cx.registry(), info, object)?;
        self.out.write_u32::<LittleEndian>(object.class_guid().0)?;
        walk(self, ty, object.as_any())
    }

    fn visit_asset_ref(&mut self, _info: &AssetRefInfo, value: AssetRef) -> Result<()> {
        self.out.write_u64::<LittleEndian>(value.guid().0)?;
        Ok(())
    }

    fn visit_array(&mut self, info: &ArrayInfo, value: &dyn Any) -> Result<()> {
        let len = info.len(value)?;
        self.write_len(len, "array")?;
        for index in 0..len {
            walk(self, &info.element, info.element(value, index)?)?;
        }
        Ok(())
    }
}

pub struct BinaryReader<'a, R> {
    input: R,
    cx: Context<'a>,
    nesting: Nesting,
}

impl<'a, R: Read> BinaryReader<'a, R> {
    pub fn new(input: R, cx: Context<'a>) -> Self {
        Self {
            input,
            cx,
            nesting: Nesting::default(),
        }
    }

    /// Fills `value` from the stream. On error `value` may be partially
    /// overwritten.
    pub fn read_into(&mut self, ty: &TypeDescriptor, value: &mut dyn Any) -> Result<()> {
        walk_mut(self, ty, value)
    }

    /// Reads an object framed by [`BinaryWriter::write_object`].
    pub fn read_object(&mut self) -> Result<Box<dyn Object>> {
        let guid = TypeGuid(self.read_u32("class GUID")?);
        if guid.is_null() {
            return Err(Error::InvalidValue("object stream starts with a null class GUID".into()));
        }
        let registry = self.cx.registry();
        let ty = registry.stream_class(guid)?;
        let mut object = registry.create_instance(guid)?;
        walk_mut(self, ty, object.as_any_mut())?;
        Ok(object)
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.input
            .read_u32::<LittleEndian>()
            .map_err(|err| Error::from_read(err, what))
    }

    fn read_len(&mut self, what: &str) -> Result<usize> {
        let len = self.read_u32(what)? as usize;
        if len > MAX_ARRAY_LEN {
            return Err(Error::InvalidValue(format!(
                "{what} length {len} exceeds {MAX_ARRAY_LEN}"
            )));
        }
        Ok(len)
    }
}

impl<R: Read> VisitorMut for BinaryReader<'_, R> {
    fn nesting(&mut self) -> &mut Nesting {
        &mut self.nesting
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Scalar> {
        let input = &mut self.input;
        let scalar = match kind {
            PrimitiveKind::Int8 => input.read_i8().map(Scalar::I8),
            PrimitiveKind::Int16 => input.read_i16::<LittleEndian>().map(Scalar::I16),
            PrimitiveKind::Int32 => input.read_i32::<LittleEndian>().map(Scalar::I32),
            PrimitiveKind::Int64 => input.read_i64::<LittleEndian>().map(Scalar::I64),
            PrimitiveKind::UInt8 => input.read_u8().map(Scalar::U8),
            PrimitiveKind::UInt16 => input.read_u16::<LittleEndian>().map(Scalar::U16),
            PrimitiveKind::UInt32 => input.read_u32::<LittleEndian>().map(Scalar::U32),
            PrimitiveKind::UInt64 => input.read_u64::<LittleEndian>().map(Scalar::U64),
            PrimitiveKind::Float32 => input.read_f32::<LittleEndian>().map(Scalar::F32),
            PrimitiveKind::Float64 => input.read_f64::<LittleEndian>().map(Scalar::F64),
            PrimitiveKind::Bool => {
                let byte = input.read_u8().map_err(|err| Error::from_read(err, "Bool"))?;
                return match byte {
                    0 => Ok(Scalar::Bool(false)),
                    1 => Ok(Scalar::Bool(true)),
                    other => Err(Error::InvalidValue(format!("bool byte {other}"))),
                };
            }
        };
        scalar.map_err(|err| Error::from_read(err, kind.name()))
    }

    fn read_math(&mut self, kind: MathKind) -> Result<MathValue> {
        let mut components = [0f32; 16];
        let components = &mut components[..kind.components()];
        self.input
            .read_f32_into::<LittleEndian>(components)
            .map_err(|err| Error::from_read(err, kind.name()))?;
        MathValue::from_components(kind, components).ok_or_else(|| Error::mismatch(kind.name()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_len("string")?;
        let mut bytes = vec![0u8; len];
        self.input
            .read_exact(&mut bytes)
            .map_err(|err| Error::from_read(err, "string"))?;
        String::from_utf8(bytes).map_err(|err| Error::InvalidValue(format!("string: {err}")))
    }

    fn read_enum(&mut self, _info: &EnumInfo, is_flags: bool) -> Result<u32> {
        self.read_u32(if is_flags { "flags" } else { "enum" })
    }

    fn read_asset_ref(&mut self, info: &AssetRefInfo) -> Result<AssetRef> {
        let guid = self
            .input
            .read_u64::<LittleEndian>()
            .map_err(|err| Error::from_read(err, "asset reference"))?;
        self.cx.resolve_asset(info, AssetRef::new(ObjectGuid(guid)))
    }

    fn visit_struct(
        &mut self,
        _ty: &TypeDescriptor,
        info: &StructInfo,
        value: &mut dyn Any,
    ) -> Result<()> {
        walk_fields_mut(self, &info.fields, value)
    }

    fn visit_class(
        &mut self,
        _ty: &TypeDescriptor,
        info: &ClassInfo,
        value: &mut dyn Any,
    ) -> Result<()> {
        walk_class_mut(self, info, value)
    }

    fn visit_pointer(&mut self, info: &PointerInfo, slot: &mut ObjectPtr) -> Result<()> {
        let guid = TypeGuid(self.read_u32("class GUID")?);
        if guid.is_null() {
            *slot = None;
            return Ok(());
        }
        let (ty, mut object) = instantiate(self.cx.registry(), info, guid)?;
        walk_mut(self, &ty, object.as_any_mut())?;
        *slot = Some(object);
        Ok(())
    }

    fn visit_array(&mut self, info: &ArrayInfo, value: &mut dyn Any) -> Result<()> {
        let len = self.read_len("array")?;
        info.reset(value, len)?;
        for index in 0..len {
            walk_mut(self, &info.element, info.element_mut(value, index)?)?;
        }
        Ok(())
    }
}

pub fn serialize<W: Write>(
    out: W,
    cx: Context<'_>,
    ty: &TypeDescriptor,
    value: &dyn Any,
) -> Result<()> {
    BinaryWriter::new(out, cx).write(ty, value)
}

pub fn to_bytes(cx: Context<'_>, ty: &TypeDescriptor, value: &dyn Any) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    serialize(&mut bytes, cx, ty, value)?;
    Ok(bytes)
}

pub fn deserialize_into<R: Read>(
    input: R,
    cx: Context<'_>,
    ty: &TypeDescriptor,
    value: &mut dyn Any,
) -> Result<()> {
    BinaryReader::new(input, cx).read_into(ty, value)
}

/// Reads a fresh `T`; nothing is returned unless the whole value decoded.
pub fn deserialize<T: Any + Default, R: Read>(
    input: R,
    cx: Context<'_>,
    ty: &TypeDescriptor,
) -> Result<T> {
    let mut value = T::default();
    deserialize_into(input, cx, ty, &mut value)?;
    Ok(value)
}

pub fn serialize_object<W: Write>(out: W, cx: Context<'_>, object: &dyn Object) -> Result<()> {
    BinaryWriter::new(out, cx).write_object(object)
}

pub fn deserialize_object<R: Read>(input: R, cx: Context<'_>) -> Result<Box<dyn Object>> {
    BinaryReader::new(input, cx).read_object()
}

//! Leaf values produced and consumed by the generic walk.
//!
//! The dispatcher in [`crate::visitor`] converts primitive and math fields
//! into these enums so that codecs never downcast leaf storage themselves.

use std::any::Any;

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::types::{MathKind, PrimitiveKind};

/// A primitive value read from (or destined for) a reflected field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

impl Scalar {
    pub fn kind(self) -> PrimitiveKind {
        match self {
            Self::I8(_) => PrimitiveKind::Int8,
            Self::I16(_) => PrimitiveKind::Int16,
            Self::I32(_) => PrimitiveKind::Int32,
            Self::I64(_) => PrimitiveKind::Int64,
            Self::U8(_) => PrimitiveKind::UInt8,
            Self::U16(_) => PrimitiveKind::UInt16,
            Self::U32(_) => PrimitiveKind::UInt32,
            Self::U64(_) => PrimitiveKind::UInt64,
            Self::F32(_) => PrimitiveKind::Float32,
            Self::F64(_) => PrimitiveKind::Float64,
            Self::Bool(_) => PrimitiveKind::Bool,
        }
    }

    /// Reads the field storage as `kind`. `None` when the storage is of a
    /// different Rust type.
    pub fn load(kind: PrimitiveKind, value: &dyn Any) -> Option<Self> {
        Some(match kind {
            PrimitiveKind::Int8 => Self::I8(*value.downcast_ref()?),
            PrimitiveKind::Int16 => Self::I16(*value.downcast_ref()?),
            PrimitiveKind::Int32 => Self::I32(*value.downcast_ref()?),
            PrimitiveKind::Int64 => Self::I64(*value.downcast_ref()?),
            PrimitiveKind::UInt8 => Self::U8(*value.downcast_ref()?),
            PrimitiveKind::UInt16 => Self::U16(*value.downcast_ref()?),
            PrimitiveKind::UInt32 => Self::U32(*value.downcast_ref()?),
            PrimitiveKind::UInt64 => Self::U64(*value.downcast_ref()?),
            PrimitiveKind::Float32 => Self::F32(*value.downcast_ref()?),
            PrimitiveKind::Float64 => Self::F64(*value.downcast_ref()?),
            PrimitiveKind::Bool => Self::Bool(*value.downcast_ref()?),
        })
    }

    /// Writes into field storage; false on a storage type mismatch.
    pub fn store(self, value: &mut dyn Any) -> bool {
        fn put<T: Any>(slot: &mut dyn Any, v: T) -> bool {
            match slot.downcast_mut::<T>() {
                Some(slot) => {
                    *slot = v;
                    true
                }
                None => false,
            }
        }

        match self {
            Self::I8(v) => put(value, v),
            Self::I16(v) => put(value, v),
            Self::I32(v) => put(value, v),
            Self::I64(v) => put(value, v),
            Self::U8(v) => put(value, v),
            Self::U16(v) => put(value, v),
            Self::U32(v) => put(value, v),
            Self::U64(v) => put(value, v),
            Self::F32(v) => put(value, v),
            Self::F64(v) => put(value, v),
            Self::Bool(v) => put(value, v),
        }
    }
}

/// A fixed-size math value. Colors are RGBA stored in a [`Vec4`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MathValue {
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Quat(Quat),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    Color(Vec4),
}

impl MathValue {
    pub fn kind(&self) -> MathKind {
        match self {
            Self::Vec2(_) => MathKind::Vec2,
            Self::Vec3(_) => MathKind::Vec3,
            Self::Vec4(_) => MathKind::Vec4,
            Self::Quat(_) => MathKind::Quat,
            Self::Mat2(_) => MathKind::Mat2,
            Self::Mat3(_) => MathKind::Mat3,
            Self::Mat4(_) => MathKind::Mat4,
            Self::Color(_) => MathKind::Color,
        }
    }

    pub fn load(kind: MathKind, value: &dyn Any) -> Option<Self> {
        Some(match kind {
            MathKind::Vec2 => Self::Vec2(*value.downcast_ref()?),
            MathKind::Vec3 => Self::Vec3(*value.downcast_ref()?),
            MathKind::Vec4 => Self::Vec4(*value.downcast_ref()?),
            MathKind::Quat => Self::Quat(*value.downcast_ref()?),
            MathKind::Mat2 => Self::Mat2(*value.downcast_ref()?),
            MathKind::Mat3 => Self::Mat3(*value.downcast_ref()?),
            MathKind::Mat4 => Self::Mat4(*value.downcast_ref()?),
            MathKind::Color => Self::Color(*value.downcast_ref()?),
        })
    }

    pub fn store(self, value: &mut dyn Any) -> bool {
        fn put<T: Any>(slot: &mut dyn Any, v: T) -> bool {
            slot.downcast_mut::<T>().map(|slot| *slot = v).is_some()
        }

        match self {
            Self::Vec2(v) => put(value, v),
            Self::Vec3(v) => put(value, v),
            Self::Vec4(v) | Self::Color(v) => put(value, v),
            Self::Quat(v) => put(value, v),
            Self::Mat2(v) => put(value, v),
            Self::Mat3(v) => put(value, v),
            Self::Mat4(v) => put(value, v),
        }
    }

    /// Components in wire order: vectors xyzw, quaternions xyzw, matrices
    /// column-major, colors rgba.
    pub fn components(&self) -> Vec<f32> {
        match self {
            Self::Vec2(v) => v.to_array().to_vec(),
            Self::Vec3(v) => v.to_array().to_vec(),
            Self::Vec4(v) | Self::Color(v) => v.to_array().to_vec(),
            Self::Quat(q) => q.to_array().to_vec(),
            Self::Mat2(m) => m.to_cols_array().to_vec(),
            Self::Mat3(m) => m.to_cols_array().to_vec(),
            Self::Mat4(m) => m.to_cols_array().to_vec(),
        }
    }

    /// Inverse of [`MathValue::components`]; `None` on a length mismatch.
    pub fn from_components(kind: MathKind, c: &[f32]) -> Option<Self> {
        if c.len() != kind.components() {
            return None;
        }
        Some(match kind {
            MathKind::Vec2 => Self::Vec2(Vec2::from_slice(c)),
            MathKind::Vec3 => Self::Vec3(Vec3::from_slice(c)),
            MathKind::Vec4 => Self::Vec4(Vec4::from_slice(c)),
            MathKind::Quat => Self::Quat(Quat::from_slice(c)),
            MathKind::Mat2 => Self::Mat2(Mat2::from_cols_slice(c)),
            MathKind::Mat3 => Self::Mat3(Mat3::from_cols_slice(c)),
            MathKind::Mat4 => Self::Mat4(Mat4::from_cols_slice(c)),
            MathKind::Color => Self::Color(Vec4::from_slice(c)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_load_rejects_wrong_storage() {
        let value = 7i32;
        assert_eq!(
            Scalar::load(PrimitiveKind::Int32, &value),
            Some(Scalar::I32(7))
        );
        assert_eq!(Scalar::load(PrimitiveKind::UInt32, &value), None);
    }

    #[test]
    fn scalar_store_writes_matching_slot() {
        let mut slot = 0u16;
        assert!(Scalar::U16(513).store(&mut slot));
        assert_eq!(slot, 513);
        assert!(!Scalar::I64(1).store(&mut slot));
    }

    #[test]
    fn matrices_use_column_major_components() {
        let m = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        let components = MathValue::Mat2(m).components();
        assert_eq!(components, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            MathValue::from_components(MathKind::Mat2, &components),
            Some(MathValue::Mat2(m))
        );
        assert_eq!(MathValue::from_components(MathKind::Mat3, &components), None);
    }
}

//! Runtime type descriptors.
//!
//! A [`TypeDescriptor`] is passive metadata describing the shape of a value:
//! its kind, its size, and for composite kinds how to reach the parts. Field
//! access goes through type-checked closures over `&dyn Any` rather than raw
//! byte offsets; offsets are recorded only so registration can validate the
//! declared layout.
//!
//! Descriptors are built once at startup and shared as [`TypeRef`]s:
//!
//! ```
//! use crystal_assets::field;
//! use crystal_assets::types::{PrimitiveKind, StructBuilder, TypeDescriptor};
//!
//! #[derive(Default)]
//! struct Extent {
//!     width: u32,
//!     height: u32,
//! }
//!
//! let u32_ty = TypeDescriptor::primitive(PrimitiveKind::UInt32);
//! let extent = StructBuilder::<Extent>::new("Extent")
//!     .field(field!(Extent, width, u32_ty.clone()))
//!     .field(field!(Extent, height, u32_ty).with_alias("Height"))
//!     .build();
//! assert_eq!(extent.as_struct().unwrap().fields.len(), 2);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::assets::AssetRef;
use crate::error::{Error, Result};
use crate::guid::TypeGuid;
use crate::registry::Object;

/// Shared handle to an immutable descriptor.
pub type TypeRef = Arc<TypeDescriptor>;

/// Constructs a default instance of a registered class.
pub type Factory = fn() -> Box<dyn Object>;

/// Storage type of every pointer field.
pub type ObjectPtr = Option<Box<dyn Object>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 11] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
        Self::Bool,
    ];

    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Bool => "Bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathKind {
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Mat2,
    Mat3,
    Mat4,
    /// RGBA color stored in a `Vec4`.
    Color,
}

impl MathKind {
    pub const ALL: [MathKind; 8] = [
        Self::Vec2,
        Self::Vec3,
        Self::Vec4,
        Self::Quat,
        Self::Mat2,
        Self::Mat3,
        Self::Mat4,
        Self::Color,
    ];

    /// Number of `f32` components on the wire.
    pub fn components(self) -> usize {
        match self {
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Quat | Self::Mat2 | Self::Color => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// In-memory size of the backing `glam` type.
    pub fn size(self) -> usize {
        match self {
            Self::Vec2 => mem::size_of::<Vec2>(),
            Self::Vec3 => mem::size_of::<Vec3>(),
            Self::Vec4 | Self::Color => mem::size_of::<Vec4>(),
            Self::Quat => mem::size_of::<Quat>(),
            Self::Mat2 => mem::size_of::<Mat2>(),
            Self::Mat3 => mem::size_of::<Mat3>(),
            Self::Mat4 => mem::size_of::<Mat4>(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Quat => "Quat",
            Self::Mat2 => "Mat2",
            Self::Mat3 => "Mat3",
            Self::Mat4 => "Mat4",
            Self::Color => "Color",
        }
    }
}

/// Shape of a described value.
#[derive(Debug)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Math(MathKind),
    String,
    Enum(EnumInfo),
    Flags(EnumInfo),
    Struct(StructInfo),
    Class(ClassInfo),
    Pointer(PointerInfo),
    AssetRef(AssetRefInfo),
    Array(ArrayInfo),
}

impl TypeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive",
            Self::Math(_) => "math",
            Self::String => "string",
            Self::Enum(_) => "enum",
            Self::Flags(_) => "flags",
            Self::Struct(_) => "struct",
            Self::Class(_) => "class",
            Self::Pointer(_) => "pointer",
            Self::AssetRef(_) => "asset-ref",
            Self::Array(_) => "array",
        }
    }
}

/// A complete type descriptor.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: String,
    /// In-memory size of the Rust type backing this descriptor.
    pub size: usize,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, size: usize, kind: TypeKind) -> TypeRef {
        Arc::new(Self {
            name: name.into(),
            size,
            kind,
        })
    }

    pub fn primitive(kind: PrimitiveKind) -> TypeRef {
        Self::new(kind.name(), kind.size(), TypeKind::Primitive(kind))
    }

    pub fn math(kind: MathKind) -> TypeRef {
        Self::new(kind.name(), kind.size(), TypeKind::Math(kind))
    }

    pub fn string() -> TypeRef {
        Self::new("String", mem::size_of::<String>(), TypeKind::String)
    }

    /// Describes a C-like enum stored as `T`.
    pub fn enumeration<T: Any>(
        name: impl Into<String>,
        members: Vec<EnumMember>,
        to_u32: fn(&T) -> u32,
        from_u32: fn(u32) -> Option<T>,
    ) -> TypeRef {
        let info = EnumInfo {
            members,
            access: EnumAccess::new(to_u32, from_u32),
        };
        Self::new(name, mem::size_of::<T>(), TypeKind::Enum(info))
    }

    /// Describes a bit set stored as `T`; members name individual bits.
    pub fn flags<T: Any>(
        name: impl Into<String>,
        members: Vec<EnumMember>,
        to_u32: fn(&T) -> u32,
        from_u32: fn(u32) -> Option<T>,
    ) -> TypeRef {
        let info = EnumInfo {
            members,
            access: EnumAccess::new(to_u32, from_u32),
        };
        Self::new(name, mem::size_of::<T>(), TypeKind::Flags(info))
    }

    /// Describes a `Vec<T>` whose elements are described by `element`.
    pub fn array<T: Any + Default>(element: TypeRef) -> TypeRef {
        let name = format!("Array<{}>", element.name);
        let info = ArrayInfo {
            element,
            access: ArrayAccess::vec::<T>(),
        };
        Self::new(name, mem::size_of::<Vec<T>>(), TypeKind::Array(info))
    }

    /// Describes an owning [`ObjectPtr`] to an instance of `pointee` or of
    /// one of its subclasses.
    pub fn pointer(pointee: TypeRef) -> TypeRef {
        let name = format!("Ptr<{}>", pointee.name);
        Self::new(
            name,
            mem::size_of::<ObjectPtr>(),
            TypeKind::Pointer(PointerInfo { pointee }),
        )
    }

    /// Describes an [`AssetRef`] to an asset of `asset_kind`. A null
    /// reference falls back to the content database's default asset.
    pub fn asset_ref(asset_kind: impl Into<String>) -> TypeRef {
        Self::asset_ref_with(asset_kind.into(), false)
    }

    /// Like [`TypeDescriptor::asset_ref`], but a null reference stays empty
    /// instead of being default-initialized.
    pub fn optional_asset_ref(asset_kind: impl Into<String>) -> TypeRef {
        Self::asset_ref_with(asset_kind.into(), true)
    }

    fn asset_ref_with(asset_kind: String, no_default_init: bool) -> TypeRef {
        Self::new(
            format!("AssetRef<{asset_kind}>"),
            mem::size_of::<AssetRef>(),
            TypeKind::AssetRef(AssetRefInfo {
                asset_kind,
                no_default_init,
            }),
        )
    }

    pub fn as_struct(&self) -> Option<&StructInfo> {
        match &self.kind {
            TypeKind::Struct(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            TypeKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        self.as_class().is_some()
    }

    /// True when `self` is `ancestor` or derives from it.
    pub fn is_a(&self, ancestor: &TypeDescriptor) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.name == ancestor.name {
                return true;
            }
            current = ty
                .as_class()
                .and_then(|class| class.base.as_ref())
                .map(|base| base.ty.as_ref());
        }
        false
    }

    /// Checks the declared layout: fields inside the owner, class members
    /// clear of the embedded base, pointers and bases naming classes.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };
        match &self.kind {
            TypeKind::Struct(info) => self.validate_fields(&info.fields, None),
            TypeKind::Class(info) => {
                let base_range = match &info.base {
                    Some(base) => {
                        if !base.ty.is_class() {
                            return Err(invalid(format!("base {} is not a class", base.ty.name)));
                        }
                        let end = base.offset + base.ty.size;
                        if end > self.size {
                            return Err(invalid(format!(
                                "base {} ends at {end}, past size {}",
                                base.ty.name, self.size
                            )));
                        }
                        Some(base.offset..end)
                    }
                    None => None,
                };
                self.validate_fields(&info.fields, base_range)
            }
            TypeKind::Pointer(info) if !info.pointee.is_class() => Err(invalid(format!(
                "pointee {} is not a class",
                info.pointee.name
            ))),
            TypeKind::Array(info) => info.element.validate(),
            _ => Ok(()),
        }
    }

    fn validate_fields(
        &self,
        fields: &[Field],
        base: Option<std::ops::Range<usize>>,
    ) -> Result<()> {
        for field in fields {
            let end = field.offset + field.ty.size;
            if end > self.size {
                return Err(Error::InvalidDescriptor {
                    name: self.name.clone(),
                    reason: format!("field {} ends at {end}, past size {}", field.name, self.size),
                });
            }
            if let Some(base) = &base {
                if field.offset < base.end && base.start < end {
                    return Err(Error::InvalidDescriptor {
                        name: self.name.clone(),
                        reason: format!("field {} overlaps the base class", field.name),
                    });
                }
            }
            field.ty.validate()?;
        }
        Ok(())
    }
}

type GetFn = Box<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;
type GetMutFn = Box<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;

fn shared<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any>,
{
    f
}

fn exclusive<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>,
{
    f
}

/// Type-checked projection from an owner value to one of its members.
pub struct FieldAccess {
    get: GetFn,
    get_mut: GetMutFn,
}

impl FieldAccess {
    pub fn new<O: Any, T: Any>(get: fn(&O) -> &T, get_mut: fn(&mut O) -> &mut T) -> Self {
        Self {
            get: Box::new(shared(move |owner| {
                owner.downcast_ref::<O>().map(|o| get(o) as &dyn Any)
            })),
            get_mut: Box::new(exclusive(move |owner| {
                owner
                    .downcast_mut::<O>()
                    .map(|o| get_mut(o) as &mut dyn Any)
            })),
        }
    }

    pub fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        (self.get)(owner)
    }

    pub fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        (self.get_mut)(owner)
    }
}

impl fmt::Debug for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccess").finish_non_exhaustive()
    }
}

/// A named member of a struct or class.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    /// Key used by the text format; defaults to `name`.
    pub alias: String,
    pub offset: usize,
    pub ty: TypeRef,
    access: FieldAccess,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeRef, offset: usize, access: FieldAccess) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            offset,
            ty,
            access,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any> {
        self.access
            .get(owner)
            .ok_or_else(|| Error::mismatch(format!("owner of field {}", self.name)))
    }

    pub fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut dyn Any> {
        self.access
            .get_mut(owner)
            .ok_or_else(|| Error::mismatch(format!("owner of field {}", self.name)))
    }
}

/// Declares a [`Field`] for `$owner.$member` with its offset and accessors.
#[macro_export]
macro_rules! field {
    ($owner:ty, $member:ident, $ty:expr) => {
        $crate::types::Field::new(
            stringify!($member),
            $ty,
            ::std::mem::offset_of!($owner, $member),
            $crate::types::FieldAccess::new(
                |owner: &$owner| &owner.$member,
                |owner: &mut $owner| &mut owner.$member,
            ),
        )
    };
}

#[derive(Debug)]
pub struct StructInfo {
    pub fields: Vec<Field>,
}

/// The embedded base of a class.
#[derive(Debug)]
pub struct BaseClass {
    pub ty: TypeRef,
    pub offset: usize,
    access: FieldAccess,
}

impl BaseClass {
    pub fn get<'a>(&self, owner: &'a dyn Any) -> Result<&'a dyn Any> {
        self.access
            .get(owner)
            .ok_or_else(|| Error::mismatch(format!("subclass of {}", self.ty.name)))
    }

    pub fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Result<&'a mut dyn Any> {
        self.access
            .get_mut(owner)
            .ok_or_else(|| Error::mismatch(format!("subclass of {}", self.ty.name)))
    }
}

#[derive(Debug)]
pub struct ClassInfo {
    pub guid: TypeGuid,
    pub base: Option<BaseClass>,
    pub fields: Vec<Field>,
    /// False for root marker classes that carry no persisted state.
    pub persisted: bool,
    pub factory: Option<Factory>,
}

impl ClassInfo {
    /// The base to recurse into before this class's own fields, if any.
    pub fn persisted_base(&self) -> Option<(&BaseClass, &ClassInfo)> {
        let base = self.base.as_ref()?;
        let info = base.ty.as_class()?;
        info.persisted.then_some((base, info))
    }
}

#[derive(Debug)]
pub struct PointerInfo {
    pub pointee: TypeRef,
}

#[derive(Debug, Clone)]
pub struct AssetRefInfo {
    pub asset_kind: String,
    pub no_default_init: bool,
}

type LenFn = Box<dyn Fn(&dyn Any) -> Option<usize> + Send + Sync>;
type ResizeFn = Box<dyn Fn(&mut dyn Any, usize) -> bool + Send + Sync>;
type ElementFn = Box<dyn for<'a> Fn(&'a dyn Any, usize) -> Option<&'a dyn Any> + Send + Sync>;
type ElementMutFn =
    Box<dyn for<'a> Fn(&'a mut dyn Any, usize) -> Option<&'a mut dyn Any> + Send + Sync>;

fn indexed<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any, usize) -> Option<&'a dyn Any>,
{
    f
}

fn indexed_mut<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut dyn Any, usize) -> Option<&'a mut dyn Any>,
{
    f
}

/// Count / resize / element accessors for array storage.
pub struct ArrayAccess {
    len: LenFn,
    resize: ResizeFn,
    element: ElementFn,
    element_mut: ElementMutFn,
}

impl ArrayAccess {
    pub fn vec<T: Any + Default>() -> Self {
        Self {
            len: Box::new(|array: &dyn Any| array.downcast_ref::<Vec<T>>().map(Vec::len)),
            resize: Box::new(|array: &mut dyn Any, len: usize| {
                array
                    .downcast_mut::<Vec<T>>()
                    .map(|items| {
                        items.clear();
                        items.resize_with(len, T::default);
                    })
                    .is_some()
            }),
            element: Box::new(indexed(|array, index| {
                array
                    .downcast_ref::<Vec<T>>()?
                    .get(index)
                    .map(|item| item as &dyn Any)
            })),
            element_mut: Box::new(indexed_mut(|array, index| {
                array
                    .downcast_mut::<Vec<T>>()?
                    .get_mut(index)
                    .map(|item| item as &mut dyn Any)
            })),
        }
    }
}

impl fmt::Debug for ArrayAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayAccess").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ArrayInfo {
    pub element: TypeRef,
    access: ArrayAccess,
}

impl ArrayInfo {
    pub fn len(&self, array: &dyn Any) -> Result<usize> {
        (self.access.len)(array).ok_or_else(|| self.mismatch())
    }

    /// Replaces the contents with `len` default elements.
    pub fn reset(&self, array: &mut dyn Any, len: usize) -> Result<()> {
        if (self.access.resize)(array, len) {
            Ok(())
        } else {
            Err(self.mismatch())
        }
    }

    pub fn element<'a>(&self, array: &'a dyn Any, index: usize) -> Result<&'a dyn Any> {
        (self.access.element)(array, index).ok_or_else(|| self.mismatch())
    }

    pub fn element_mut<'a>(&self, array: &'a mut dyn Any, index: usize) -> Result<&'a mut dyn Any> {
        (self.access.element_mut)(array, index).ok_or_else(|| self.mismatch())
    }

    fn mismatch(&self) -> Error {
        Error::mismatch(format!("Array<{}>", self.element.name))
    }
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: String,
    pub alias: String,
    pub value: u32,
}

impl EnumMember {
    pub fn new(name: impl Into<String>, value: u32) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            value,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

type ToU32Fn = Box<dyn Fn(&dyn Any) -> Option<u32> + Send + Sync>;
type FromU32Fn = Box<dyn Fn(&mut dyn Any, u32) -> Option<bool> + Send + Sync>;

/// Converts enum storage to and from its underlying `u32`.
pub struct EnumAccess {
    get: ToU32Fn,
    set: FromU32Fn,
}

impl EnumAccess {
    pub fn new<T: Any>(to_u32: fn(&T) -> u32, from_u32: fn(u32) -> Option<T>) -> Self {
        Self {
            get: Box::new(move |value: &dyn Any| value.downcast_ref::<T>().map(to_u32)),
            set: Box::new(move |value: &mut dyn Any, raw: u32| {
                let slot = value.downcast_mut::<T>()?;
                Some(match from_u32(raw) {
                    Some(converted) => {
                        *slot = converted;
                        true
                    }
                    None => false,
                })
            }),
        }
    }
}

impl fmt::Debug for EnumAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumAccess").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct EnumInfo {
    pub members: Vec<EnumMember>,
    access: EnumAccess,
}

impl EnumInfo {
    pub fn get(&self, ty: &TypeDescriptor, value: &dyn Any) -> Result<u32> {
        (self.access.get)(value).ok_or_else(|| Error::mismatch(&ty.name))
    }

    /// Stores `raw`; `InvalidValue` when the storage type rejects it.
    pub fn set(&self, ty: &TypeDescriptor, value: &mut dyn Any, raw: u32) -> Result<()> {
        match (self.access.set)(value, raw) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::InvalidValue(format!(
                "{raw:#x} is not a valid {}",
                ty.name
            ))),
            None => Err(Error::mismatch(&ty.name)),
        }
    }

    pub fn member_by_value(&self, value: u32) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.value == value)
    }

    /// Looks a member up by alias, falling back to its declared name.
    pub fn member_by_text(&self, text: &str) -> Option<&EnumMember> {
        self.members
            .iter()
            .find(|m| m.alias == text)
            .or_else(|| self.members.iter().find(|m| m.name == text))
    }

    pub fn all_bits(&self) -> u32 {
        self.members.iter().fold(0, |bits, m| bits | m.value)
    }

    /// An enum value must name a member; flags may only set declared bits.
    pub fn accepts(&self, raw: u32, is_flags: bool) -> bool {
        if is_flags {
            raw & !self.all_bits() == 0
        } else {
            self.member_by_value(raw).is_some()
        }
    }

    /// Text form: the member alias, or `A|B` for flags (`""` when empty).
    pub fn to_symbolic(&self, raw: u32, is_flags: bool) -> Option<String> {
        if !is_flags {
            return self.member_by_value(raw).map(|m| m.alias.clone());
        }
        let mut remaining = raw;
        let mut names = Vec::new();
        for member in self.members.iter().filter(|m| m.value != 0) {
            if raw & member.value == member.value {
                names.push(member.alias.as_str());
                remaining &= !member.value;
            }
        }
        (remaining == 0).then(|| names.join("|"))
    }

    pub fn from_symbolic(&self, text: &str, is_flags: bool) -> Option<u32> {
        if !is_flags {
            return self.member_by_text(text.trim()).map(|m| m.value);
        }
        text.split('|')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(0u32, |bits, part| {
                self.member_by_text(part).map(|m| bits | m.value)
            })
    }
}

/// Builds the descriptor of a plain struct `O`.
pub struct StructBuilder<O> {
    name: String,
    fields: Vec<Field>,
    _owner: PhantomData<fn() -> O>,
}

impl<O: Any> StructBuilder<O> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            _owner: PhantomData,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a member without the `field!` macro.
    pub fn member<T: Any>(
        self,
        name: impl Into<String>,
        ty: TypeRef,
        offset: usize,
        get: fn(&O) -> &T,
        get_mut: fn(&mut O) -> &mut T,
    ) -> Self {
        self.field(Field::new(name, ty, offset, FieldAccess::new(get, get_mut)))
    }

    pub fn build(self) -> TypeRef {
        TypeDescriptor::new(
            self.name,
            mem::size_of::<O>(),
            TypeKind::Struct(StructInfo {
                fields: self.fields,
            }),
        )
    }
}

/// Builds the descriptor of a polymorphic class `O`.
pub struct ClassBuilder<O> {
    name: String,
    guid: Option<TypeGuid>,
    base: Option<BaseClass>,
    fields: Vec<Field>,
    persisted: bool,
    factory: Option<Factory>,
    _owner: PhantomData<fn() -> O>,
}

impl<O: Any> ClassBuilder<O> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: None,
            base: None,
            fields: Vec::new(),
            persisted: true,
            factory: None,
            _owner: PhantomData,
        }
    }

    /// Pins the persisted GUID. Without it the GUID is derived from the
    /// class name.
    pub fn guid(mut self, guid: u32) -> Self {
        self.guid = Some(TypeGuid(guid));
        self
    }

    /// Declares the embedded base class member.
    pub fn base<B: Any>(
        mut self,
        ty: TypeRef,
        offset: usize,
        get: fn(&O) -> &B,
        get_mut: fn(&mut O) -> &mut B,
    ) -> Self {
        self.base = Some(BaseClass {
            ty,
            offset,
            access: FieldAccess::new(get, get_mut),
        });
        self
    }

    /// Marks a root class without persisted state; subclasses skip it.
    pub fn root_marker(mut self) -> Self {
        self.persisted = false;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn member<T: Any>(
        self,
        name: impl Into<String>,
        ty: TypeRef,
        offset: usize,
        get: fn(&O) -> &T,
        get_mut: fn(&mut O) -> &mut T,
    ) -> Self {
        self.field(Field::new(name, ty, offset, FieldAccess::new(get, get_mut)))
    }

    pub fn factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> TypeRef {
        let guid = self
            .guid
            .unwrap_or_else(|| TypeGuid::from_name(&self.name));
        TypeDescriptor::new(
            self.name,
            mem::size_of::<O>(),
            TypeKind::Class(ClassInfo {
                guid,
                base: self.base,
                fields: self.fields,
                persisted: self.persisted,
                factory: self.factory,
            }),
        )
    }
}

impl<O: Object + Default> ClassBuilder<O> {
    /// Registers `O::default` as the factory.
    pub fn default_factory(self) -> Self {
        fn make<O: Object + Default>() -> Box<dyn Object> {
            Box::new(O::default())
        }
        self.factory(make::<O>)
    }
}

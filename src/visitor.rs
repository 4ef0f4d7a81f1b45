//! Generic traversal of described values.
//!
//! [`walk`] and [`walk_mut`] are the only places that branch on
//! [`TypeKind`]. Leaves are handed to the visitor as [`Scalar`],
//! [`MathValue`], strings, raw enum values and [`AssetRef`]s; composite
//! kinds call back into the visitor, which recurses through the `walk_*`
//! helpers in whatever shape its format needs.
//!
//! Pointers own their pointee, so a value graph is always a tree. Every
//! composite level counts against [`MAX_NESTING_DEPTH`].

use std::any::Any;
use std::collections::HashSet;

use crate::assets::AssetRef;
use crate::error::{Error, Result};
use crate::guid::{ObjectGuid, TypeGuid};
use crate::registry::{Object, TypeRegistry};
use crate::types::{
    ArrayInfo, AssetRefInfo, ClassInfo, EnumInfo, Field, MathKind, ObjectPtr, PointerInfo,
    PrimitiveKind, StructInfo, TypeDescriptor, TypeKind, TypeRef,
};
use crate::value::{MathValue, Scalar};

pub const MAX_NESTING_DEPTH: usize = 128;

/// Composite depth counter shared by every codec.
#[derive(Debug, Default)]
pub struct Nesting {
    depth: usize,
}

impl Nesting {
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Error::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Read-only traversal of a value.
pub trait Visitor: Sized {
    type Output;

    fn nesting(&mut self) -> &mut Nesting;

    fn visit_primitive(&mut self, value: Scalar) -> Result<Self::Output>;

    fn visit_math(&mut self, value: MathValue) -> Result<Self::Output>;

    fn visit_string(&mut self, value: &str) -> Result<Self::Output>;

    fn visit_enum(&mut self, info: &EnumInfo, raw: u32) -> Result<Self::Output>;

    fn visit_flags(&mut self, info: &EnumInfo, raw: u32) -> Result<Self::Output>;

    fn visit_struct(&mut self, info: &StructInfo, value: &dyn Any) -> Result<Self::Output>;

    fn visit_class(&mut self, info: &ClassInfo, value: &dyn Any) -> Result<Self::Output>;

    fn visit_pointer(
        &mut self,
        info: &PointerInfo,
        target: Option<&dyn Object>,
    ) -> Result<Self::Output>;

    fn visit_asset_ref(&mut self, info: &AssetRefInfo, value: AssetRef) -> Result<Self::Output>;

    fn visit_array(&mut self, info: &ArrayInfo, value: &dyn Any) -> Result<Self::Output>;
}

/// Traversal that fills a value in place. Leaves are produced by the
/// visitor and stored by [`walk_mut`]; composites recurse through the
/// `walk_*_mut` helpers.
pub trait VisitorMut: Sized {
    fn nesting(&mut self) -> &mut Nesting;

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Scalar>;

    fn read_math(&mut self, kind: MathKind) -> Result<MathValue>;

    fn read_string(&mut self) -> Result<String>;

    fn read_enum(&mut self, info: &EnumInfo, is_flags: bool) -> Result<u32>;

    fn read_asset_ref(&mut self, info: &AssetRefInfo) -> Result<AssetRef>;

    fn visit_struct(&mut self, ty: &TypeDescriptor, info: &StructInfo, value: &mut dyn Any)
        -> Result<()>;

    fn visit_class(&mut self, ty: &TypeDescriptor, info: &ClassInfo, value: &mut dyn Any)
        -> Result<()>;

    fn visit_pointer(&mut self, info: &PointerInfo, slot: &mut ObjectPtr) -> Result<()>;

    fn visit_array(&mut self, info: &ArrayInfo, value: &mut dyn Any) -> Result<()>;
}

fn nested<N, R>(
    visitor: &mut N,
    nesting: fn(&mut N) -> &mut Nesting,
    body: impl FnOnce(&mut N) -> Result<R>,
) -> Result<R> {
    nesting(visitor).enter()?;
    let result = body(visitor);
    nesting(visitor).leave();
    result
}

pub fn walk<V: Visitor>(visitor: &mut V, ty: &TypeDescriptor, value: &dyn Any) -> Result<V::Output> {
    let mismatch = || Error::mismatch(&ty.name);
    match &ty.kind {
        TypeKind::Primitive(kind) => {
            visitor.visit_primitive(Scalar::load(*kind, value).ok_or_else(mismatch)?)
        }
        TypeKind::Math(kind) => visitor.visit_math(MathValue::load(*kind, value).ok_or_else(mismatch)?),
        TypeKind::String => {
            visitor.visit_string(value.downcast_ref::<String>().ok_or_else(mismatch)?)
        }
        TypeKind::Enum(info) => {
            let raw = info.get(ty, value)?;
            visitor.visit_enum(info, raw)
        }
        TypeKind::Flags(info) => {
            let raw = info.get(ty, value)?;
            visitor.visit_flags(info, raw)
        }
        TypeKind::Struct(info) => nested(visitor, V::nesting, |v| v.visit_struct(info, value)),
        TypeKind::Class(info) => nested(visitor, V::nesting, |v| v.visit_class(info, value)),
        TypeKind::Pointer(info) => {
            let target = value.downcast_ref::<ObjectPtr>().ok_or_else(mismatch)?;
            nested(visitor, V::nesting, |v| v.visit_pointer(info, target.as_deref()))
        }
        TypeKind::AssetRef(info) => {
            let reference = value.downcast_ref::<AssetRef>().ok_or_else(mismatch)?;
            visitor.visit_asset_ref(info, *reference)
        }
        TypeKind::Array(info) => nested(visitor, V::nesting, |v| v.visit_array(info, value)),
    }
}

pub fn walk_mut<V: VisitorMut>(
    visitor: &mut V,
    ty: &TypeDescriptor,
    value: &mut dyn Any,
) -> Result<()> {
    let mismatch = || Error::mismatch(&ty.name);
    match &ty.kind {
        TypeKind::Primitive(kind) => {
            let scalar = visitor.read_primitive(*kind)?;
            if scalar.kind() != *kind || !scalar.store(value) {
                return Err(mismatch());
            }
            Ok(())
        }
        TypeKind::Math(kind) => {
            let math = visitor.read_math(*kind)?;
            if math.kind() != *kind || !math.store(value) {
                return Err(mismatch());
            }
            Ok(())
        }
        TypeKind::String => {
            let text = visitor.read_string()?;
            *value.downcast_mut::<String>().ok_or_else(mismatch)? = text;
            Ok(())
        }
        TypeKind::Enum(info) | TypeKind::Flags(info) => {
            let is_flags = matches!(ty.kind, TypeKind::Flags(_));
            let raw = visitor.read_enum(info, is_flags)?;
            if !info.accepts(raw, is_flags) {
                return Err(Error::InvalidValue(format!(
                    "{raw:#x} is not a valid {}",
                    ty.name
                )));
            }
            info.set(ty, value, raw)
        }
        TypeKind::Struct(info) => {
            nested(visitor, V::nesting, |v| v.visit_struct(ty, info, value))
        }
        TypeKind::Class(info) => nested(visitor, V::nesting, |v| v.visit_class(ty, info, value)),
        TypeKind::Pointer(info) => {
            let slot = value.downcast_mut::<ObjectPtr>().ok_or_else(mismatch)?;
            nested(visitor, V::nesting, |v| v.visit_pointer(info, slot))
        }
        TypeKind::AssetRef(info) => {
            let reference = visitor.read_asset_ref(info)?;
            *value.downcast_mut::<AssetRef>().ok_or_else(mismatch)? = reference;
            Ok(())
        }
        TypeKind::Array(info) => nested(visitor, V::nesting, |v| v.visit_array(info, value)),
    }
}

/// Visits `fields` of `value` in declaration order.
pub fn walk_fields<V: Visitor<Output = ()>>(
    visitor: &mut V,
    fields: &[Field],
    value: &dyn Any,
) -> Result<()> {
    for field in fields {
        walk(visitor, &field.ty, field.get(value)?)?;
    }
    Ok(())
}

pub fn walk_fields_mut<V: VisitorMut>(
    visitor: &mut V,
    fields: &[Field],
    value: &mut dyn Any,
) -> Result<()> {
    for field in fields {
        walk_mut(visitor, &field.ty, field.get_mut(value)?)?;
    }
    Ok(())
}

/// Visits a class linearized most-base first: the persisted base chain,
/// then the class's own fields.
pub fn walk_class<V: Visitor<Output = ()>>(
    visitor: &mut V,
    info: &ClassInfo,
    value: &dyn Any,
) -> Result<()> {
    if let Some((base, _)) = info.persisted_base() {
        walk(visitor, &base.ty, base.get(value)?)?;
    }
    walk_fields(visitor, &info.fields, value)
}

pub fn walk_class_mut<V: VisitorMut>(
    visitor: &mut V,
    info: &ClassInfo,
    value: &mut dyn Any,
) -> Result<()> {
    if let Some((base, _)) = info.persisted_base() {
        walk_mut(visitor, &base.ty, base.get_mut(value)?)?;
    }
    walk_fields_mut(visitor, &info.fields, value)
}

/// Descriptor of the object behind a pointer, checked against the declared
/// pointee.
pub fn dynamic_type<'r>(
    registry: &'r TypeRegistry,
    info: &PointerInfo,
    object: &dyn Object,
) -> Result<&'r TypeRef> {
    let ty = registry.descriptor_of(object)?;
    if !ty.is_a(&info.pointee) {
        return Err(Error::mismatch(format!(
            "{} (pointer holds {})",
            info.pointee.name, ty.name
        )));
    }
    Ok(ty)
}

/// Creates the default instance a decoded pointer payload is read into.
/// Classes unrelated to the pointee are rejected as invalid input.
pub fn instantiate(
    registry: &TypeRegistry,
    info: &PointerInfo,
    guid: TypeGuid,
) -> Result<(TypeRef, Box<dyn Object>)> {
    let ty = registry.stream_class(guid)?;
    if !ty.is_a(&info.pointee) {
        return Err(Error::InvalidValue(format!(
            "{} cannot be stored in a pointer to {}",
            ty.name, info.pointee.name
        )));
    }
    let object = registry.create_instance(guid)?;
    Ok((ty.clone(), object))
}

/// Gathers the asset GUIDs a value references, in first-seen order.
pub struct AssetCollector<'r> {
    registry: &'r TypeRegistry,
    nesting: Nesting,
    seen: HashSet<ObjectGuid>,
    guids: Vec<ObjectGuid>,
}

impl<'r> AssetCollector<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            nesting: Nesting::default(),
            seen: HashSet::new(),
            guids: Vec::new(),
        }
    }

    pub fn collect(&mut self, ty: &TypeDescriptor, value: &dyn Any) -> Result<()> {
        walk(self, ty, value)
    }

    pub fn into_guids(self) -> Vec<ObjectGuid> {
        self.guids
    }
}

impl Visitor for AssetCollector<'_> {
    type Output = ();

    fn nesting(&mut self) -> &mut Nesting {
        &mut self.nesting
    }

    fn visit_primitive(&mut self, _value: Scalar) -> Result<()> {
        Ok(())
    }

    fn visit_math(&mut self, _value: MathValue) -> Result<()> {
        Ok(())
    }

    fn visit_string(&mut self, _value: &str) -> Result<()> {
        Ok(())
    }

    fn visit_enum(&mut self, _info: &EnumInfo, _raw: u32) -> Result<()> {
        Ok(())
    }

    fn visit_flags(&mut self, _info: &EnumInfo, _raw: u32) -> Result<()> {
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
            return Ok(());
        };
        let ty = dynamic_type(self.registry, info, object)?;
        walk(self, ty, object.as_any())
    }

    fn visit_asset_ref(&mut self, _info: &AssetRefInfo, value: AssetRef) -> Result<()> {
        if !value.is_null() && self.seen.insert(value.guid()) {
            self.guids.push(value.guid());
        }
        Ok(())
    }

    fn visit_array(&mut self, info: &ArrayInfo, value: &dyn Any) -> Result<()> {
        for index in 0..info.len(value)? {
            walk(self, &info.element, info.element(value, index)?)?;
        }
        Ok(())
    }
}

/// Convenience wrapper around [`AssetCollector`].
pub fn collect_asset_refs(
    registry: &TypeRegistry,
    ty: &TypeDescriptor,
    value: &dyn Any,
) -> Result<Vec<ObjectGuid>> {
    let mut collector = AssetCollector::new(registry);
    collector.collect(ty, value)?;
    Ok(collector.into_guids())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use crate::types::{ClassBuilder, StructBuilder};

    #[derive(Debug, Default)]
    struct Material {
        albedo: AssetRef,
        normal: AssetRef,
    }

    #[derive(Debug, Default)]
    struct Prop {
        materials: Vec<Material>,
        child: ObjectPtr,
    }
    crate::impl_object!(Prop, name = "Prop");

    fn fixture() -> (TypeRegistry, TypeRef) {
        let texture = TypeDescriptor::optional_asset_ref("texture");
        let material = StructBuilder::<Material>::new("Material")
            .field(field!(Material, albedo, texture.clone()))
            .field(field!(Material, normal, texture))
            .build();
        let prop_stub = ClassBuilder::<Prop>::new("Prop").build();
        let prop = ClassBuilder::<Prop>::new("Prop")
            .field(field!(Prop, materials, TypeDescriptor::array::<Material>(material)))
            .field(field!(Prop, child, TypeDescriptor::pointer(prop_stub)))
            .default_factory()
            .build();
        let registry = TypeRegistry::builder()
            .register_class(prop.clone())
            .build()
            .unwrap();
        (registry, prop)
    }

    #[test]
    fn collector_follows_arrays_and_pointers_without_duplicates() {
        let (registry, prop_ty) = fixture();
        let stone = AssetRef::from_path("textures/stone.png");
        let bump = AssetRef::from_path("textures/bump.png");
        let moss = AssetRef::from_path("textures/moss.png");
        let prop = Prop {
            materials: vec![
                Material {
                    albedo: stone,
                    normal: bump,
                },
                Material {
                    albedo: stone,
                    normal: AssetRef::null(),
                },
            ],
            child: Some(Box::new(Prop {
                materials: vec![Material {
                    albedo: moss,
                    normal: bump,
                }],
                child: None,
            })),
        };
        let guids = collect_asset_refs(&registry, &prop_ty, &prop).unwrap();
        assert_eq!(guids, vec![stone.guid(), bump.guid(), moss.guid()]);
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let mut nesting = Nesting::default();
        for _ in 0..MAX_NESTING_DEPTH {
            nesting.enter().unwrap();
        }
        assert!(matches!(nesting.enter(), Err(Error::NestingTooDeep(_))));
        nesting.leave();
        assert_eq!(nesting.depth(), MAX_NESTING_DEPTH - 1);
    }

    #[test]
    fn deep_pointer_chain_is_rejected() {
        let (registry, prop_ty) = fixture();
        let mut prop = Prop::default();
        for _ in 0..MAX_NESTING_DEPTH {
            prop = Prop {
                materials: Vec::new(),
                child: Some(Box::new(prop)),
            };
        }
        assert!(matches!(
            collect_asset_refs(&registry, &prop_ty, &prop),
            Err(Error::NestingTooDeep(_))
        ));
    }

    #[derive(Debug, Default)]
    struct Entity {
        id: u32,
    }
    crate::impl_object!(Entity, name = "Entity");

    #[derive(Debug, Default)]
    struct Pawn {
        entity: Entity,
    }
    crate::impl_object!(Pawn, name = "Pawn");

    #[derive(Debug, Default)]
    struct Actor {
        pawn: Pawn,
        child: ObjectPtr,
    }
    crate::impl_object!(Actor, name = "Actor");

    fn actor_chain(links: usize) -> Actor {
        let mut actor = Actor::default();
        for _ in 0..links {
            actor = Actor {
                pawn: Pawn::default(),
                child: Some(Box::new(actor)),
            };
        }
        actor
    }

    #[test]
    fn base_classes_count_toward_nesting() {
        let entity = ClassBuilder::<Entity>::new("Entity")
            .field(field!(Entity, id, TypeDescriptor::primitive(PrimitiveKind::UInt32)))
            .default_factory()
            .build();
        let pawn = ClassBuilder::<Pawn>::new("Pawn")
            .base(
                entity.clone(),
                std::mem::offset_of!(Pawn, entity),
                |p| &p.entity,
                |p| &mut p.entity,
            )
            .default_factory()
            .build();
        let actor_stub = ClassBuilder::<Actor>::new("Actor").build();
        let actor = ClassBuilder::<Actor>::new("Actor")
            .base(
                pawn.clone(),
                std::mem::offset_of!(Actor, pawn),
                |a| &a.pawn,
                |a| &mut a.pawn,
            )
            .field(field!(Actor, child, TypeDescriptor::pointer(actor_stub)))
            .default_factory()
            .build();
        let registry = TypeRegistry::builder()
            .register_class(entity)
            .register_class(pawn)
            .register_class(actor.clone())
            .build()
            .unwrap();

        // the innermost actor sits at depth 2 * links + 1, its two bases below it
        collect_asset_refs(&registry, &actor, &actor_chain(62)).unwrap();
        assert!(matches!(
            collect_asset_refs(&registry, &actor, &actor_chain(63)),
            Err(Error::NestingTooDeep(_))
        ));
    }

    #[test]
    fn wrong_storage_is_a_type_mismatch() {
        let (registry, prop_ty) = fixture();
        assert!(matches!(
            collect_asset_refs(&registry, &prop_ty, &42u32),
            Err(Error::TypeMismatch { .. })
        ));
    }
}

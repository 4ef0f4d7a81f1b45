use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::guid::TypeGuid;
use crate::types::{MathKind, PrimitiveKind, TypeDescriptor, TypeKind, TypeRef};

/// A polymorphic instance reachable through pointer fields.
///
/// `class_guid` reports the dynamic class so the serializer can persist it
/// and look up the concrete descriptor.
pub trait Object: Any {
    fn class_guid(&self) -> TypeGuid;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Object {
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.class_guid())
    }
}

/// Implements [`Object`] for a class, with either a pinned GUID
/// (`guid = 0x1234`) or one derived from the class name (`name = "Mesh"`).
#[macro_export]
macro_rules! impl_object {
    ($ty:ty, guid = $guid:expr) => {
        impl $crate::registry::Object for $ty {
            fn class_guid(&self) -> $crate::guid::TypeGuid {
                $crate::guid::TypeGuid($guid)
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
    ($ty:ty, name = $name:expr) => {
        impl $crate::registry::Object for $ty {
            fn class_guid(&self) -> $crate::guid::TypeGuid {
                $crate::guid::TypeGuid::from_name($name)
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

/// Collects descriptors during startup. [`RegistryBuilder::build`] validates
/// them and produces the immutable [`TypeRegistry`]; nothing can be
/// registered afterwards.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<TypeRef>,
    classes: HashSet<String>,
}

impl RegistryBuilder {
    pub fn register(mut self, ty: TypeRef) -> Self {
        self.types.push(ty);
        self
    }

    /// Registers a polymorphic class; anything else fails at build time.
    pub fn register_class(mut self, ty: TypeRef) -> Self {
        self.classes.insert(ty.name.clone());
        self.register(ty)
    }

    pub fn build(self) -> Result<TypeRegistry> {
        let mut registry = TypeRegistry::default();
        for kind in PrimitiveKind::ALL {
            registry.insert(TypeDescriptor::primitive(kind))?;
        }
        for kind in MathKind::ALL {
            registry.insert(TypeDescriptor::math(kind))?;
        }
        registry.insert(TypeDescriptor::string())?;

        for ty in self.types {
            if self.classes.contains(&ty.name) && !ty.is_class() {
                return Err(Error::InvalidDescriptor {
                    name: ty.name.clone(),
                    reason: format!("registered as a class but is a {}", ty.kind.tag()),
                });
            }
            ty.validate()?;
            registry.insert(ty)?;
        }

        for ty in registry.by_name.values() {
            if let Some(base) = ty.as_class().and_then(|class| class.base.as_ref()) {
                if !registry.by_name.contains_key(&base.ty.name) {
                    return Err(Error::UnregisteredType(format!(
                        "{} (base of {})",
                        base.ty.name, ty.name
                    )));
                }
            }
        }

        debug!(
            "type registry built: {} types, {} classes",
            registry.by_name.len(),
            registry.by_guid.len()
        );
        Ok(registry)
    }
}

/// Process-wide catalog of descriptors, built once and then shared by
/// reference with every serializer and package operation.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, TypeRef>,
    by_guid: HashMap<TypeGuid, TypeRef>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn insert(&mut self, ty: TypeRef) -> Result<()> {
        if self.by_name.contains_key(&ty.name) {
            return Err(Error::DuplicateType(ty.name.clone()));
        }
        if let TypeKind::Class(class) = &ty.kind {
            if class.guid.is_null() {
                return Err(Error::InvalidDescriptor {
                    name: ty.name.clone(),
                    reason: "class GUID 0 is reserved for null pointers".into(),
                });
            }
            if let Some(existing) = self.by_guid.get(&class.guid) {
                return Err(Error::DuplicateType(format!(
                    "{} and {} share GUID {}",
                    existing.name, ty.name, class.guid
                )));
            }
            self.by_guid.insert(class.guid, ty.clone());
        }
        self.by_name.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&TypeRef> {
        self.by_name.get(name)
    }

    pub fn find_by_guid(&self, guid: TypeGuid) -> Option<&TypeRef> {
        self.by_guid.get(&guid)
    }

    pub fn expect_by_name(&self, name: &str) -> Result<&TypeRef> {
        self.find_by_name(name)
            .ok_or_else(|| Error::UnregisteredType(name.to_string()))
    }

    pub fn expect_by_guid(&self, guid: TypeGuid) -> Result<&TypeRef> {
        self.find_by_guid(guid)
            .ok_or_else(|| Error::UnregisteredType(format!("class GUID {guid}")))
    }

    /// Looks up a class GUID read from a stream. A miss means the stream is
    /// corrupt or was written against another schema.
    pub fn stream_class(&self, guid: TypeGuid) -> Result<&TypeRef> {
        self.find_by_guid(guid)
            .ok_or_else(|| Error::UnknownClass(format!("class GUID {guid}")))
    }

    pub fn stream_class_named(&self, name: &str) -> Result<&TypeRef> {
        self.find_by_name(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    /// Descriptor of the dynamic class of `object`.
    pub fn descriptor_of(&self, object: &dyn Object) -> Result<&TypeRef> {
        self.expect_by_guid(object.class_guid())
    }

    /// Constructs a default instance of the class registered under `guid`.
    pub fn create_instance(&self, guid: TypeGuid) -> Result<Box<dyn Object>> {
        let ty = self.expect_by_guid(guid)?;
        let factory = ty
            .as_class()
            .and_then(|class| class.factory)
            .ok_or_else(|| Error::UnregisteredType(format!("{} has no factory", ty.name)))?;
        let object = factory();
        if object.class_guid() != guid {
            return Err(Error::mismatch(format!(
                "{} (factory produced class {})",
                ty.name,
                object.class_guid()
            )));
        }
        Ok(object)
    }

    pub fn is_subclass(&self, derived: &TypeDescriptor, base: &TypeDescriptor) -> bool {
        derived.is_a(base)
    }

    /// Digest of every user-registered type's name, class GUID and field
    /// list. Packages store it so payloads written against another schema
    /// can be detected.
    pub fn schema_tag(&self) -> u32 {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();
        let mut hasher = Md5::new();
        for name in names {
            let ty = &self.by_name[name];
            let fields = match &ty.kind {
                TypeKind::Struct(info) => &info.fields,
                TypeKind::Class(info) => {
                    hasher.update(info.guid.0.to_le_bytes());
                    &info.fields
                }
                _ => continue,
            };
            hasher.update(name.as_bytes());
            for field in fields {
                hasher.update(field.name.as_bytes());
                hasher.update(field.ty.name.as_bytes());
            }
        }
        let digest = hasher.finalize();
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

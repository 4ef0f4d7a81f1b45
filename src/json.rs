//! JSON form of described values.
//!
//! Documents are wrapped in an envelope naming their type:
//!
//! ```json
//! { "__type__": "Mesh", "__data__": { "name": "crate", "__base__": { ... } } }
//! ```
//!
//! Fields are keyed by alias, so documents survive field reordering. A
//! class's persisted base is nested under `__base__`. Pointers use the same
//! envelope (or `null`), asset references are `{"assetPath", "assetType"}`
//! objects (or `null`), and math values are flat arrays of components.

use std::any::Any;
use std::fs;
use std::path::Path;

use log::debug;
use serde_json::{Map, Number, Value};

use crate::assets::{AssetRef, AssetResolver};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::registry::Object;
use crate::types::{
    ArrayInfo, AssetRefInfo, ClassInfo, EnumInfo, Field, MathKind, ObjectPtr, PointerInfo,
    PrimitiveKind, StructInfo, TypeDescriptor,
};
use crate::value::{MathValue, Scalar};
use crate::visitor::{dynamic_type, instantiate, walk, walk_mut, Nesting, Visitor, VisitorMut};

pub const TYPE_KEY: &str = "__type__";
pub const DATA_KEY: &str = "__data__";
pub const BASE_KEY: &str = "__base__";
pub const ASSET_PATH_KEY: &str = "assetPath";
pub const ASSET_TYPE_KEY: &str = "assetType";

/// How enum and flags values are written. Decoding accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumStyle {
    /// Member alias; flags as `"A|B"`.
    #[default]
    Symbolic,
    /// The underlying `u32`.
    Numeric,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    pub enum_style: EnumStyle,
    pub pretty: bool,
}

impl JsonOptions {
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }

    pub fn with_enum_style(mut self, enum_style: EnumStyle) -> Self {
        self.enum_style = enum_style;
        self
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedJson(message.into())
}

fn no_content() -> Error {
    Error::UnresolvedAssetReference("no content database attached".into())
}

fn envelope(type_name: &str, data: Value) -> Value {
    let mut map = Map::new();
    map.insert(TYPE_KEY.into(), Value::String(type_name.into()));
    map.insert(DATA_KEY.into(), data);
    Value::Object(map)
}

/// Splits an envelope into its type name and payload.
fn open_envelope(doc: &Value) -> Result<(&str, &Value)> {
    let map = doc
        .as_object()
        .ok_or_else(|| malformed("expected a type envelope object"))?;
    let name = map
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("envelope is missing string {TYPE_KEY:?}")))?;
    let data = map
        .get(DATA_KEY)
        .ok_or_else(|| malformed(format!("envelope is missing {DATA_KEY:?}")))?;
    Ok((name, data))
}

pub struct JsonEncoder<'a> {
    cx: Context<'a>,
    options: JsonOptions,
    nesting: Nesting,
}

impl<'a> JsonEncoder<'a> {
    pub fn new(cx: Context<'a>, options: JsonOptions) -> Self {
        Self {
            cx,
            options,
            nesting: Nesting::default(),
        }
    }

    pub fn encode(&mut self, ty: &TypeDescriptor, value: &dyn Any) -> Result<Value> {
        walk(self, ty, value)
    }

    fn float(value: f64) -> Result<Value> {
        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| Error::InvalidValue(format!("{value} cannot be written as JSON")))
    }

    fn enum_value(&self, info: &EnumInfo, raw: u32, is_flags: bool) -> Value {
        match self.options.enum_style {
            EnumStyle::Symbolic => info
                .to_symbolic(raw, is_flags)
                .map(Value::String)
                .unwrap_or_else(|| Value::from(raw)),
            EnumStyle::Numeric => Value::from(raw),
        }
    }

    fn fields(&mut self, fields: &[Field], value: &dyn Any) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        for field in fields {
            let encoded = walk(self, &field.ty, field.get(value)?)?;
            map.insert(field.alias.clone(), encoded);
        }
        Ok(map)
    }
}

impl Visitor for JsonEncoder<'_> {
    type Output = Value;

    fn nesting(&mut self) -> &mut Nesting {
        &mut self.nesting
    }

    fn visit_primitive(&mut self, value: Scalar) -> Result<Value> {
        Ok(match value {
            Scalar::I8(v) => Value::from(v),
            Scalar::I16(v) => Value::from(v),
            Scalar::I32(v) => Value::from(v),
            Scalar::I64(v) => Value::from(v),
            Scalar::U8(v) => Value::from(v),
            Scalar::U16(v) => Value::from(v),
            Scalar::U32(v) => Value::from(v),
            Scalar::U64(v) => Value::from(v),
            Scalar::F32(v) => Self::float(f64::from(v))?,
            Scalar::F64(v) => Self::float(v)?,
            Scalar::Bool(v) => Value::Bool(v),
        })
    }

    fn visit_math(&mut self, value: MathValue) -> Result<Value> {
        value
            .components()
            .into_iter()
            .map(|c| Self::float(f64::from(c)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn visit_string(&mut self, value: &str) -> Result<Value> {
        Ok(Value::String(value.to_string()))
    }

    fn visit_enum(&mut self, info: &EnumInfo, raw: u32) -> Result<Value> {
        Ok(self.enum_value(info, raw, false))
    }

    fn visit_flags(&mut self, info: &EnumInfo, raw: u32) -> Result<Value> {
        Ok(self.enum_value(info, raw, true))
    }

    fn visit_struct(&mut self, info: &StructInfo, value: &dyn Any) -> Result<Value> {
        self.fields(&info.fields, value).map(Value::Object)
    }

    fn visit_class(&mut self, info: &ClassInfo, value: &dyn Any) -> Result<Value> {
        let base = match info.persisted_base() {
            Some((base, _)) => Some(walk(self, &base.ty, base.get(value)?)?),
            None => None,
        };
        let mut map = self.fields(&info.fields, value)?;
        if let Some(base) = base {
            map.insert(BASE_KEY.into(), base);
        }
        Ok(Value::Object(map))
    }

    fn visit_pointer(&mut self, info: &PointerInfo, target: Option<&dyn Object>) -> Result<Value> {
        let Some(object) = target else {
            return Ok(Value::Null);
        };
        let ty = dynamic_type(self.cx.registry(), info, object)?;
        let data = walk(self, ty, object.as_any())?;
        Ok(envelope(&ty.name, data))
    }

    fn visit_asset_ref(&mut self, info: &AssetRefInfo, value: AssetRef) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let resolver = self.cx.resolver().ok_or_else(no_content)?;
        let path = resolver.path_of(value)?.unwrap_or_default();
        let mut map = Map::new();
        map.insert(ASSET_PATH_KEY.into(), Value::String(path));
        map.insert(ASSET_TYPE_KEY.into(), Value::String(info.asset_kind.clone()));
        Ok(Value::Object(map))
    }

    fn visit_array(&mut self, info: &ArrayInfo, value: &dyn Any) -> Result<Value> {
        let len = info.len(value)?;
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            items.push(walk(self, &info.element, info.element(value, index)?)?);
        }
        Ok(Value::Array(items))
    }
}

/// Decodes a document tree into values, tracking the node under the cursor.
pub struct JsonDecoder<'a, 'doc> {
    cx: Context<'a>,
    current: &'doc Value,
    nesting: Nesting,
}

impl<'a, 'doc> JsonDecoder<'a, 'doc> {
    pub fn new(cx: Context<'a>, doc: &'doc Value) -> Self {
        Self {
            cx,
            current: doc,
            nesting: Nesting::default(),
        }
    }

    pub fn decode_into(&mut self, ty: &TypeDescriptor, value: &mut dyn Any) -> Result<()> {
        walk_mut(self, ty, value)
    }

    fn at<R>(&mut self, node: &'doc Value, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let saved = std::mem::replace(&mut self.current, node);
        let result = body(self);
        self.current = saved;
        result
    }

    fn object(&self, what: &str) -> Result<&'doc Map<String, Value>> {
        self.current
            .as_object()
            .ok_or_else(|| malformed(format!("expected an object for {what}")))
    }

    fn fields(
        &mut self,
        owner: &str,
        fields: &[Field],
        map: &'doc Map<String, Value>,
        value: &mut dyn Any,
    ) -> Result<()> {
        for field in fields {
            let node = map
                .get(&field.alias)
                .ok_or_else(|| malformed(format!("{owner} is missing field {:?}", field.alias)))?;
            let slot = field.get_mut(value)?;
            self.at(node, |d| walk_mut(d, &field.ty, slot))?;
        }
        Ok(())
    }

    fn resolver(&self) -> Result<AssetResolver<'a>> {
        self.cx.resolver().ok_or_else(no_content)
    }
}

fn integer<T: TryFrom<i64>>(value: &Value, kind: PrimitiveKind) -> Result<T> {
    let raw = value
        .as_i64()
        .ok_or_else(|| malformed(format!("expected an integer for {}", kind.name())))?;
    T::try_from(raw).map_err(|_| Error::InvalidValue(format!("{raw} out of range for {}", kind.name())))
}

fn unsigned<T: TryFrom<u64>>(value: &Value, kind: PrimitiveKind) -> Result<T> {
    let raw = value
        .as_u64()
        .ok_or_else(|| malformed(format!("expected an unsigned integer for {}", kind.name())))?;
    T::try_from(raw).map_err(|_| Error::InvalidValue(format!("{raw} out of range for {}", kind.name())))
}

fn float(value: &Value, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| malformed(format!("expected a number for {what}")))
}

impl VisitorMut for JsonDecoder<'_, '_> {
    fn nesting(&mut self) -> &mut Nesting {
        &mut self.nesting
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Scalar> {
        let v = self.current;
        Ok(match kind {
            PrimitiveKind::Int8 => Scalar::I8(integer(v, kind)?),
            PrimitiveKind::Int16 => Scalar::I16(integer(v, kind)?),
            PrimitiveKind::Int32 => Scalar::I32(integer(v, kind)?),
            PrimitiveKind::Int64 => Scalar::I64(integer(v, kind)?),
            PrimitiveKind::UInt8 => Scalar::U8(unsigned(v, kind)?),
            PrimitiveKind::UInt16 => Scalar::U16(unsigned(v, kind)?),
            PrimitiveKind::UInt32 => Scalar::U32(unsigned(v, kind)?),
            PrimitiveKind::UInt64 => Scalar::U64(unsigned(v, kind)?),
            PrimitiveKind::Float32 => Scalar::F32(float(v, kind.name())? as f32),
            PrimitiveKind::Float64 => Scalar::F64(float(v, kind.name())?),
            PrimitiveKind::Bool => Scalar::Bool(
                v.as_bool()
                    .ok_or_else(|| malformed("expected a boolean"))?,
            ),
        })
    }

    fn read_math(&mut self, kind: MathKind) -> Result<MathValue> {
        let items = self
            .current
            .as_array()
            .ok_or_else(|| malformed(format!("expected an array for {}", kind.name())))?;
        let components = items
            .iter()
            .map(|item| float(item, kind.name()).map(|c| c as f32))
            .collect::<Result<Vec<_>>>()?;
        MathValue::from_components(kind, &components).ok_or_else(|| {
            malformed(format!(
                "{} needs {} components, found {}",
                kind.name(),
                kind.components(),
                components.len()
            ))
        })
    }

    fn read_string(&mut self) -> Result<String> {
        self.current
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| malformed("expected a string"))
    }

    fn read_enum(&mut self, info: &EnumInfo, is_flags: bool) -> Result<u32> {
        match self.current {
            Value::Number(number) => number
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| Error::InvalidValue(format!("{number} is not a u32"))),
            Value::String(text) => info
                .from_symbolic(text, is_flags)
                .ok_or_else(|| Error::InvalidValue(format!("unknown member {text:?}"))),
            _ => Err(malformed("expected a string or number for an enum")),
        }
    }

    fn read_asset_ref(&mut self, info: &AssetRefInfo) -> Result<AssetRef> {
        if self.current.is_null() {
            return self.cx.resolve_asset(info, AssetRef::null());
        }
        let map = self.object("an asset reference")?;
        let path = map
            .get(ASSET_PATH_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(format!("asset reference is missing {ASSET_PATH_KEY:?}")))?;
        let kind = map
            .get(ASSET_TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(format!("asset reference is missing {ASSET_TYPE_KEY:?}")))?;
        if kind != info.asset_kind {
            return Err(Error::UnresolvedAssetReference(format!(
                "{path:?} is tagged {kind}, expected {}",
                info.asset_kind
            )));
        }
        self.resolver()?.resolve_path(info, Some(path))
    }

    fn visit_struct(
        &mut self,
        ty: &TypeDescriptor,
        info: &StructInfo,
        value: &mut dyn Any,
    ) -> Result<()> {
        let map = self.object(&ty.name)?;
        self.fields(&ty.name, &info.fields, map, value)
    }

    fn visit_class(
        &mut self,
        ty: &TypeDescriptor,
        info: &ClassInfo,
        value: &mut dyn Any,
    ) -> Result<()> {
        let map = self.object(&ty.name)?;
        if let Some((base, _)) = info.persisted_base() {
            let node = map
                .get(BASE_KEY)
                .ok_or_else(|| malformed(format!("{} is missing {BASE_KEY:?}", ty.name)))?;
            let slot = base.get_mut(value)?;
            self.at(node, |d| walk_mut(d, &base.ty, slot))?;
        }
        self.fields(&ty.name, &info.fields, map, value)
    }

    fn visit_pointer(&mut self, info: &PointerInfo, slot: &mut ObjectPtr) -> Result<()> {
        if self.current.is_null() {
            *slot = None;
            return Ok(());
        }
        let (name, data) = open_envelope(self.current)?;
        let registry = self.cx.registry();
        let guid = registry
            .stream_class_named(name)?
            .as_class()
            .map(|class| class.guid)
            .ok_or_else(|| Error::InvalidValue(format!("{name} is not a class")))?;
        let (ty, mut object) = instantiate(registry, info, guid)?;
        self.at(data, |d| walk_mut(d, &ty, object.as_any_mut()))?;
        *slot = Some(object);
        Ok(())
    }

    fn visit_array(&mut self, info: &ArrayInfo, value: &mut dyn Any) -> Result<()> {
        let items = self
            .current
            .as_array()
            .ok_or_else(|| malformed(format!("expected an array of {}", info.element.name)))?;
        info.reset(value, items.len())?;
        for (index, item) in items.iter().enumerate() {
            let slot = info.element_mut(value, index)?;
            self.at(item, |d| walk_mut(d, &info.element, slot))?;
        }
        Ok(())
    }
}

/// Encodes a bare payload, without an envelope.
pub fn encode(
    cx: Context<'_>,
    ty: &TypeDescriptor,
    value: &dyn Any,
    options: JsonOptions,
) -> Result<Value> {
    JsonEncoder::new(cx, options).encode(ty, value)
}

pub fn decode_into(
    cx: Context<'_>,
    ty: &TypeDescriptor,
    doc: &Value,
    value: &mut dyn Any,
) -> Result<()> {
    JsonDecoder::new(cx, doc).decode_into(ty, value)
}

pub fn decode<T: Any + Default>(cx: Context<'_>, ty: &TypeDescriptor, doc: &Value) -> Result<T> {
    let mut value = T::default();
    decode_into(cx, ty, doc, &mut value)?;
    Ok(value)
}

/// Encodes `value` inside an envelope naming `ty`.
pub fn encode_document(
    cx: Context<'_>,
    ty: &TypeDescriptor,
    value: &dyn Any,
    options: JsonOptions,
) -> Result<Value> {
    Ok(envelope(&ty.name, encode(cx, ty, value, options)?))
}

/// Decodes an envelope that must name `ty`.
pub fn decode_document<T: Any + Default>(
    cx: Context<'_>,
    ty: &TypeDescriptor,
    doc: &Value,
) -> Result<T> {
    let (name, data) = open_envelope(doc)?;
    if name != ty.name {
        return Err(Error::mismatch(format!("{} (document holds {name})", ty.name)));
    }
    decode(cx, ty, data)
}

pub fn encode_object(cx: Context<'_>, object: &dyn Object, options: JsonOptions) -> Result<Value> {
    let ty = cx.registry().descriptor_of(object)?;
    encode_document(cx, ty, object.as_any(), options)
}

/// Decodes an envelope into a new instance of the class it names.
pub fn decode_object(cx: Context<'_>, doc: &Value) -> Result<Box<dyn Object>> {
    let (name, data) = open_envelope(doc)?;
    let registry = cx.registry();
    let ty = registry.stream_class_named(name)?;
    let class = ty
        .as_class()
        .ok_or_else(|| Error::InvalidValue(format!("{name} is not a class")))?;
    let mut object = registry.create_instance(class.guid)?;
    decode_into(cx, ty, data, object.as_any_mut())?;
    Ok(object)
}

pub fn to_string(
    cx: Context<'_>,
    ty: &TypeDescriptor,
    value: &dyn Any,
    options: JsonOptions,
) -> Result<String> {
    let doc = encode_document(cx, ty, value, options)?;
    render(&doc, options)
}

pub fn from_str<T: Any + Default>(cx: Context<'_>, ty: &TypeDescriptor, text: &str) -> Result<T> {
    let doc = parse(text)?;
    decode_document(cx, ty, &doc)
}

fn render(doc: &Value, options: JsonOptions) -> Result<String> {
    let text = if options.pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    };
    text.map_err(|err| Error::InvalidValue(err.to_string()))
}

fn parse(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|err| malformed(err.to_string()))
}

/// Writes `object` as a pretty-printed envelope.
pub fn save_object_to_file<P: AsRef<Path>>(
    path: P,
    cx: Context<'_>,
    object: &dyn Object,
) -> Result<()> {
    let options = JsonOptions::pretty();
    let text = render(&encode_object(cx, object, options)?, options)?;
    fs::write(path.as_ref(), text)?;
    debug!("saved object to {}", path.as_ref().display());
    Ok(())
}

pub fn load_object_from_file<P: AsRef<Path>>(path: P, cx: Context<'_>) -> Result<Box<dyn Object>> {
    let text = fs::read_to_string(path.as_ref())?;
    decode_object(cx, &parse(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentDatabase;
    use crate::field;
    use crate::registry::TypeRegistry;
    use crate::types::{ClassBuilder, EnumMember, TypeRef};
    use glam::Vec2;
    use once_cell::sync::Lazy;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, Default, PartialEq)]
    struct Widget {
        label: String,
        anchor: Vec2,
        visible: bool,
    }
    crate::impl_object!(Widget, guid = 0x7701);

    #[derive(Debug, Default, PartialEq)]
    struct Button {
        widget: Widget,
        align: u8,
        style: u32,
        icon: AssetRef,
    }
    crate::impl_object!(Button, guid = 0x7702);

    static TYPES: Lazy<(TypeRef, TypeRef)> = Lazy::new(|| {
        let widget = ClassBuilder::<Widget>::new("Widget")
            .guid(0x7701)
            .field(field!(Widget, label, TypeDescriptor::string()))
            .field(field!(Widget, anchor, TypeDescriptor::math(MathKind::Vec2)))
            .field(
                field!(Widget, visible, TypeDescriptor::primitive(PrimitiveKind::Bool))
                    .with_alias("isVisible"),
            )
            .default_factory()
            .build();
        let align = TypeDescriptor::enumeration::<u8>(
            "Align",
            vec![
                EnumMember::new("Left", 0).with_alias("left"),
                EnumMember::new("Center", 1).with_alias("center"),
            ],
            |v| u32::from(*v),
            |raw| u8::try_from(raw).ok(),
        );
        let style = TypeDescriptor::flags::<u32>(
            "Style",
            vec![EnumMember::new("Bold", 1), EnumMember::new("Italic", 2)],
            |v| *v,
            Some,
        );
        let button = ClassBuilder::<Button>::new("Button")
            .guid(0x7702)
            .base(
                widget.clone(),
                std::mem::offset_of!(Button, widget),
                |b| &b.widget,
                |b| &mut b.widget,
            )
            .field(field!(Button, align, align))
            .field(field!(Button, style, style))
            .field(field!(
                Button,
                icon,
                TypeDescriptor::optional_asset_ref("texture")
            ))
            .default_factory()
            .build();
        (widget, button)
    });

    static REGISTRY: Lazy<TypeRegistry> = Lazy::new(|| {
        TypeRegistry::builder()
            .register_class(TYPES.0.clone())
            .register_class(TYPES.1.clone())
            .build()
            .unwrap()
    });

    fn button() -> Button {
        Button {
            widget: Widget {
                label: "OK".into(),
                anchor: Vec2::new(0.5, 1.0),
                visible: true,
            },
            align: 1,
            style: 3,
            icon: AssetRef::null(),
        }
    }

    #[test]
    fn symbolic_enums_and_base_nesting() {
        let cx = Context::new(&REGISTRY);
        let doc = encode_object(cx, &button(), JsonOptions::default()).unwrap();
        assert_eq!(
            doc,
            json!({
                "__type__": "Button",
                "__data__": {
                    "__base__": { "label": "OK", "anchor": [0.5, 1.0], "isVisible": true },
                    "align": "center",
                    "style": "Bold|Italic",
                    "icon": null
                }
            })
        );
        let decoded = decode_object(cx, &doc).unwrap();
        assert_eq!(decoded.downcast_ref::<Button>(), Some(&button()));
    }

    #[test]
    fn numeric_enums_round_trip() {
        let cx = Context::new(&REGISTRY);
        let options = JsonOptions::default().with_enum_style(EnumStyle::Numeric);
        let doc = encode(cx, &TYPES.1, &button(), options).unwrap();
        assert_eq!(doc["align"], json!(1));
        assert_eq!(doc["style"], json!(3));
        let decoded: Button = decode(cx, &TYPES.1, &doc).unwrap();
        assert_eq!(decoded, button());
    }

    #[test]
    fn decoder_accepts_both_enum_forms() {
        let cx = Context::new(&REGISTRY);
        let mut doc = encode(cx, &TYPES.1, &button(), JsonOptions::default()).unwrap();
        doc["align"] = json!(0);
        doc["style"] = json!("Italic");
        let decoded: Button = decode(cx, &TYPES.1, &doc).unwrap();
        assert_eq!(decoded.align, 0);
        assert_eq!(decoded.style, 2);

        doc["style"] = json!("Underline");
        assert!(matches!(
            decode::<Button>(cx, &TYPES.1, &doc),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn missing_field_is_malformed() {
        let cx = Context::new(&REGISTRY);
        let mut doc = encode(cx, &TYPES.1, &button(), JsonOptions::default()).unwrap();
        doc["__base__"].as_object_mut().unwrap().remove("isVisible");
        assert!(matches!(
            decode::<Button>(cx, &TYPES.1, &doc),
            Err(Error::MalformedJson(_))
        ));
        assert!(matches!(
            decode::<Button>(cx, &TYPES.1, &json!([1, 2])),
            Err(Error::MalformedJson(_))
        ));
    }

    #[test]
    fn null_asset_refs_without_content() {
        let cx = Context::new(&REGISTRY);
        let doc = encode(cx, &TYPES.1, &button(), JsonOptions::default()).unwrap();
        assert_eq!(doc["icon"], json!(null));
        let decoded: Button = decode(cx, &TYPES.1, &doc).unwrap();
        assert!(decoded.icon.is_null());

        let required = TypeDescriptor::asset_ref("texture");
        assert!(matches!(
            decode::<AssetRef>(cx, &required, &json!(null)),
            Err(Error::UnresolvedAssetReference(_))
        ));
    }

    #[test]
    fn asset_paths_resolve_through_content() {
        let db = MemoryContentDatabase::new();
        let guid = db.insert("icons/ok.png", "texture", vec![0]);
        let cx = Context::new(&REGISTRY).with_content(&db);
        let mut value = button();
        value.icon = AssetRef::new(guid);

        let doc = encode(cx, &TYPES.1, &value, JsonOptions::default()).unwrap();
        assert_eq!(
            doc["icon"],
            json!({ "assetPath": "icons/ok.png", "assetType": "texture" })
        );
        let decoded: Button = decode(cx, &TYPES.1, &doc).unwrap();
        assert_eq!(decoded.icon.guid(), guid);

        let mut doc = doc;
        doc["icon"]["assetPath"] = json!("icons/gone.png");
        assert!(matches!(
            decode::<Button>(cx, &TYPES.1, &doc),
            Err(Error::UnresolvedAssetReference(_))
        ));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let cx = Context::new(&REGISTRY);
        let mut value = button();
        value.widget.anchor = Vec2::new(f32::NAN, 0.0);
        assert!(matches!(
            encode(cx, &TYPES.1, &value, JsonOptions::default()),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn documents_check_their_type_name() {
        let cx = Context::new(&REGISTRY);
        let text = to_string(cx, &TYPES.1, &button(), JsonOptions::pretty()).unwrap();
        let decoded: Button = from_str(cx, &TYPES.1, &text).unwrap();
        assert_eq!(decoded, button());
        assert!(matches!(
            from_str::<Widget>(cx, &TYPES.0, &text),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            from_str::<Button>(cx, &TYPES.1, "{ not json"),
            Err(Error::MalformedJson(_))
        ));
    }

    #[test]
    fn objects_save_and_load_from_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("button.json");
        let cx = Context::new(&REGISTRY);
        save_object_to_file(&path, cx, &button()).unwrap();
        let loaded = load_object_from_file(&path, cx).unwrap();
        assert_eq!(loaded.downcast_ref::<Button>(), Some(&button()));
    }
}

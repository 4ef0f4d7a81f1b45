use std::io::{Cursor, Write};
use std::mem::offset_of;

use glam::{Quat, Vec3, Vec4};
use once_cell::sync::Lazy;
use serde_json::json;
use tempfile::NamedTempFile;

use crystal_assets::pak::{TableOfContents, BLOCK_SIZE, HEADER_SIZE};
use crystal_assets::types::{MathKind, ObjectPtr, PrimitiveKind};
use crystal_assets::{
    binary, field, impl_object, json, AssetRef, AssetSource, ClassBuilder, Context, Error,
    HashedPak, JsonOptions, MemoryContentDatabase, Object, ObjectGuid, OrdinalPak,
    PackageBuilder, StructBuilder, TypeDescriptor, TypeRef, TypeRegistry,
};

#[derive(Debug, Default, PartialEq)]
struct Node {
    id: u32,
    position: Vec3,
}
impl_object!(Node, guid = 0x100);

#[derive(Debug, Default, PartialEq)]
struct Light {
    node: Node,
    color: Vec4,
    intensity: f32,
}
impl_object!(Light, guid = 0x101);

#[derive(Debug, Default, PartialEq)]
struct SpotLight {
    light: Light,
    orientation: Quat,
    cookie: AssetRef,
}
impl_object!(SpotLight, guid = 0x102);

#[derive(Debug, Default)]
struct Scene {
    name: String,
    tags: Vec<u16>,
    sky: AssetRef,
    root: ObjectPtr,
    lights: Vec<ObjectPtr>,
}

struct Types {
    scene: TypeRef,
    node: TypeRef,
    light: TypeRef,
    spot: TypeRef,
}

static TYPES: Lazy<Types> = Lazy::new(|| {
    let node = ClassBuilder::<Node>::new("Node")
        .guid(0x100)
        .field(field!(Node, id, TypeDescriptor::primitive(PrimitiveKind::UInt32)))
        .field(field!(Node, position, TypeDescriptor::math(MathKind::Vec3)))
        .default_factory()
        .build();
    let light = ClassBuilder::<Light>::new("Light")
        .guid(0x101)
        .base(node.clone(), offset_of!(Light, node), |l| &l.node, |l| &mut l.node)
        .field(field!(Light, color, TypeDescriptor::math(MathKind::Color)))
        .field(field!(Light, intensity, TypeDescriptor::primitive(PrimitiveKind::Float32)))
        .default_factory()
        .build();
    let spot = ClassBuilder::<SpotLight>::new("SpotLight")
        .guid(0x102)
        .base(
            light.clone(),
            offset_of!(SpotLight, light),
            |s| &s.light,
            |s| &mut s.light,
        )
        .field(field!(SpotLight, orientation, TypeDescriptor::math(MathKind::Quat)))
        .field(field!(SpotLight, cookie, TypeDescriptor::optional_asset_ref("texture")))
        .default_factory()
        .build();
    let node_ptr = TypeDescriptor::pointer(node.clone());
    let scene = StructBuilder::<Scene>::new("Scene")
        .field(field!(Scene, name, TypeDescriptor::string()))
        .field(field!(
            Scene,
            tags,
            TypeDescriptor::array::<u16>(TypeDescriptor::primitive(PrimitiveKind::UInt16))
        ))
        .field(field!(Scene, sky, TypeDescriptor::asset_ref("texture")))
        .field(field!(Scene, root, node_ptr.clone()))
        .field(field!(Scene, lights, TypeDescriptor::array::<ObjectPtr>(node_ptr)))
        .build();
    Types {
        scene,
        node,
        light,
        spot,
    }
});

static REGISTRY: Lazy<TypeRegistry> = Lazy::new(|| {
    TypeRegistry::builder()
        .register_class(TYPES.node.clone())
        .register_class(TYPES.light.clone())
        .register_class(TYPES.spot.clone())
        .register(TYPES.scene.clone())
        .build()
        .unwrap()
});

fn content() -> MemoryContentDatabase {
    let db = MemoryContentDatabase::new();
    db.insert("textures/sky.png", "texture", vec![0x5a; 700]);
    db.insert("textures/cookie.png", "texture", vec![0xc0; 33]);
    db
}

fn spot(id: u32, cookie: AssetRef) -> SpotLight {
    SpotLight {
        light: Light {
            node: Node {
                id,
                position: Vec3::new(1.0, 4.0, -2.0),
            },
            color: Vec4::new(1.0, 0.9, 0.8, 1.0),
            intensity: 3.5,
        },
        orientation: Quat::from_rotation_y(0.5),
        cookie,
    }
}

fn scene(tags: Vec<u16>) -> Scene {
    Scene {
        name: "courtyard".into(),
        tags,
        sky: AssetRef::from_path("textures/sky.png"),
        root: Some(Box::new(Node {
            id: 1,
            position: Vec3::ZERO,
        })),
        lights: vec![
            Some(Box::new(Light {
                node: Node {
                    id: 2,
                    position: Vec3::Y,
                },
                color: Vec4::ONE,
                intensity: 1.0,
            })),
            None,
            Some(Box::new(spot(3, AssetRef::from_path("textures/cookie.png")))),
        ],
    }
}

fn same<T: PartialEq + 'static>(a: &dyn Object, b: &dyn Object) -> bool {
    matches!(
        (a.as_any().downcast_ref::<T>(), b.as_any().downcast_ref::<T>()),
        (Some(x), Some(y)) if x == y
    )
}

fn same_ptr(a: &ObjectPtr, b: &ObjectPtr) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            same::<Node>(a.as_ref(), b.as_ref())
                || same::<Light>(a.as_ref(), b.as_ref())
                || same::<SpotLight>(a.as_ref(), b.as_ref())
        }
        _ => false,
    }
}

fn assert_same_scene(a: &Scene, b: &Scene) {
    assert_eq!(a.name, b.name);
    assert_eq!(a.tags, b.tags);
    assert_eq!(a.sky, b.sky);
    assert!(same_ptr(&a.root, &b.root), "root pointers differ");
    assert_eq!(a.lights.len(), b.lights.len());
    for (index, (x, y)) in a.lights.iter().zip(&b.lights).enumerate() {
        assert!(same_ptr(x, y), "light {index} differs");
    }
}

#[test]
fn binary_round_trip_covers_every_shape() {
    let db = content();
    let cx = Context::new(&REGISTRY).with_content(&db);
    for tags in [vec![], vec![7], vec![1, 2, 3, 65535]] {
        let original = scene(tags);
        let bytes = binary::to_bytes(cx, &TYPES.scene, &original).unwrap();
        let decoded: Scene = binary::deserialize(bytes.as_slice(), cx, &TYPES.scene).unwrap();
        assert_same_scene(&decoded, &original);
    }
}

#[test]
fn polymorphic_objects_round_trip_at_each_depth() {
    let cx = Context::new(&REGISTRY);
    let objects: Vec<Box<dyn Object>> = vec![
        Box::new(Node {
            id: 9,
            position: Vec3::X,
        }),
        Box::new(spot(4, AssetRef::null()).light),
        Box::new(spot(5, AssetRef::null())),
    ];
    for object in objects {
        let mut bytes = Vec::new();
        binary::serialize_object(&mut bytes, cx, object.as_ref()).unwrap();
        assert_eq!(&bytes[..4], &object.class_guid().0.to_le_bytes());
        let decoded = binary::deserialize_object(bytes.as_slice(), cx).unwrap();
        assert!(same_ptr(&Some(object), &Some(decoded)));
    }
}

#[test]
fn json_round_trip_and_cross_format_equivalence() {
    let db = content();
    let cx = Context::new(&REGISTRY).with_content(&db);
    let original = scene(vec![4, 5]);

    let doc = json::encode(cx, &TYPES.scene, &original, JsonOptions::default()).unwrap();
    assert_eq!(doc["lights"][1], json!(null));
    assert_eq!(doc["lights"][2]["__type__"], json!("SpotLight"));
    assert_eq!(
        doc["sky"],
        json!({ "assetPath": "textures/sky.png", "assetType": "texture" })
    );
    let from_json: Scene = json::decode(cx, &TYPES.scene, &doc).unwrap();
    assert_same_scene(&from_json, &original);

    let bytes = binary::to_bytes(cx, &TYPES.scene, &from_json).unwrap();
    let from_binary: Scene = binary::deserialize(bytes.as_slice(), cx, &TYPES.scene).unwrap();
    assert_same_scene(&from_binary, &original);
}

#[test]
fn serialization_is_deterministic() {
    let db = content();
    let cx = Context::new(&REGISTRY).with_content(&db);
    let value = scene(vec![3, 1, 2]);
    assert_eq!(
        binary::to_bytes(cx, &TYPES.scene, &value).unwrap(),
        binary::to_bytes(cx, &TYPES.scene, &value).unwrap()
    );
    assert_eq!(
        json::to_string(cx, &TYPES.scene, &value, JsonOptions::default()).unwrap(),
        json::to_string(cx, &TYPES.scene, &value, JsonOptions::default()).unwrap()
    );
}

#[test]
fn unresolvable_asset_path_is_reported() {
    let db = content();
    let cx = Context::new(&REGISTRY).with_content(&db);
    let mut doc = json::encode(cx, &TYPES.scene, &scene(vec![]), JsonOptions::default()).unwrap();
    doc["sky"] = json!({ "assetPath": "textures/missing.png", "assetType": "texture" });
    assert!(matches!(
        json::decode::<Scene>(cx, &TYPES.scene, &doc),
        Err(Error::UnresolvedAssetReference(_))
    ));

    doc["sky"] = json!(null);
    assert!(matches!(
        json::decode::<Scene>(cx, &TYPES.scene, &doc),
        Err(Error::UnresolvedAssetReference(_))
    ));
}

#[test]
fn null_reference_without_default_init_stays_empty() {
    let db = content();
    let cx = Context::new(&REGISTRY).with_content(&db);
    let light = spot(8, AssetRef::null());
    let doc = json::encode(cx, &TYPES.spot, &light, JsonOptions::default()).unwrap();
    assert_eq!(doc["cookie"], json!(null));
    let decoded: SpotLight = json::decode(cx, &TYPES.spot, &doc).unwrap();
    assert!(decoded.cookie.is_null());
    assert_eq!(decoded, light);
}

#[test]
fn null_reference_falls_back_to_the_default_asset() {
    let db = content();
    let fallback = ObjectGuid::from_path("textures/sky.png");
    db.set_default("texture", fallback);
    let cx = Context::new(&REGISTRY).with_content(&db);
    let mut doc = json::encode(cx, &TYPES.scene, &scene(vec![]), JsonOptions::default()).unwrap();
    doc["sky"] = json!(null);
    let decoded: Scene = json::decode(cx, &TYPES.scene, &doc).unwrap();
    assert_eq!(decoded.sky.guid(), fallback);
}

#[test]
fn binary_asset_refs_without_content_are_never_silently_accepted() {
    let cx = Context::new(&REGISTRY);
    let mut value = scene(vec![]);
    value.lights.clear();

    for sky in [AssetRef::null(), AssetRef::from_path("textures/gone.png")] {
        value.sky = sky;
        let bytes = binary::to_bytes(cx, &TYPES.scene, &value).unwrap();
        let result = binary::deserialize::<Scene, _>(bytes.as_slice(), cx, &TYPES.scene);
        assert!(
            matches!(result, Err(Error::UnresolvedAssetReference(_))),
            "{sky:?}: {result:?}"
        );
    }

    let light = spot(2, AssetRef::null());
    let bytes = binary::to_bytes(cx, &TYPES.spot, &light).unwrap();
    let decoded: SpotLight = binary::deserialize(bytes.as_slice(), cx, &TYPES.spot).unwrap();
    assert_eq!(decoded, light);
}

#[test]
fn json_null_optional_ref_decodes_without_content() {
    let cx = Context::new(&REGISTRY);
    let light = spot(3, AssetRef::null());
    let doc = json::encode(cx, &TYPES.spot, &light, JsonOptions::default()).unwrap();
    assert_eq!(doc["cookie"], json!(null));
    let decoded: SpotLight = json::decode(cx, &TYPES.spot, &doc).unwrap();
    assert!(decoded.cookie.is_null());
}

#[test]
fn unknown_class_in_stream_is_a_data_error() {
    let cx = Context::new(&REGISTRY);
    let mut bytes = Vec::new();
    binary::serialize_object(&mut bytes, cx, &spot(1, AssetRef::null())).unwrap();
    bytes[..4].copy_from_slice(&0x0bad_u32.to_le_bytes());
    let err = binary::deserialize_object(bytes.as_slice(), cx).unwrap_err();
    assert!(matches!(err, Error::UnknownClass(_)));
    assert!(err.is_data_error());
}

fn ten_assets() -> (MemoryContentDatabase, Vec<String>) {
    let db = MemoryContentDatabase::new();
    let mut paths = Vec::new();
    for index in 0..10usize {
        let path = format!("assets/blob{index}.bin");
        let size = [0, 1, 100, 2047, 2048, 2049, 5000, 10, 4096, 333][index];
        let bytes: Vec<u8> = (0..size).map(|i| (i * 7 + index) as u8).collect();
        db.insert(&path, "bin", bytes);
        paths.push(path);
    }
    (db, paths)
}

#[test]
fn ordinal_and_hashed_packages_hold_the_same_bytes() {
    let (mut db, paths) = ten_assets();
    let mut ordinal_out = Cursor::new(Vec::new());
    let mut hashed_out = Cursor::new(Vec::new());
    {
        let mut builder = PackageBuilder::new(&REGISTRY, &mut db);
        for path in &paths {
            builder.add_path(path).unwrap();
        }
        builder.write_ordinal(&mut ordinal_out).unwrap();
        builder.write_hashed(&mut hashed_out).unwrap();
    }

    let mut ordinal = OrdinalPak::new();
    ordinal.open_bytes("ordinal", ordinal_out.into_inner()).unwrap();
    let mut hashed = HashedPak::new();
    hashed.open_bytes("hashed", hashed_out.into_inner()).unwrap();
    ordinal.verify().unwrap();
    hashed.verify().unwrap();

    for (index, path) in paths.iter().enumerate() {
        let guid = ObjectGuid::from_path(path);
        let expected = db.get(guid).unwrap().data.to_vec();
        assert_eq!(ordinal.read_to_vec(index as u32).unwrap(), expected);
        assert_eq!(hashed.read_to_vec(guid).unwrap(), expected);
    }
}

#[test]
fn entries_are_block_aligned_and_exact() {
    let (mut db, paths) = ten_assets();
    let mut out = Cursor::new(Vec::new());
    let manifest = {
        let mut builder = PackageBuilder::new(&REGISTRY, &mut db);
        for path in &paths {
            builder.add_path(path).unwrap();
        }
        builder.write_ordinal(&mut out).unwrap()
    };
    let bytes = out.into_inner();

    let mut pak = OrdinalPak::new();
    pak.open_bytes("aligned", bytes.clone()).unwrap();
    for (ordinal, entry) in pak.toc().unwrap().entries() {
        let start = entry.byte_offset();
        assert_eq!(start % BLOCK_SIZE, 0);
        let stored = &bytes[start as usize..entry.end() as usize];
        let listed = &manifest.entries[ordinal as usize];
        assert_eq!(stored, db.get(listed.guid).unwrap().data.as_ref());
        assert_eq!(u64::from(entry.size), listed.size);
    }
}

#[test]
fn hashed_package_of_three_assets() {
    let mut db = MemoryContentDatabase::new();
    let a = db.insert("a", "bin", vec![0xa1; 100]);
    let b = db.insert("b", "bin", vec![0xb2; 5000]);
    let c = db.insert("c", "bin", Vec::new());

    let mut file = NamedTempFile::new().unwrap();
    {
        let mut builder = PackageBuilder::new(&REGISTRY, &mut db);
        for guid in [a, b, c] {
            builder.add_asset(guid).unwrap();
        }
        builder.write_hashed(file.as_file_mut()).unwrap();
    }
    file.flush().unwrap();

    let mut pak = HashedPak::new();
    pak.open(file.path()).unwrap();
    let mut buf = vec![0u8; 8192];
    for (guid, size) in [(a, 100u64), (b, 5000), (c, 0)] {
        let handle = pak.open_file(guid).unwrap();
        assert_eq!(pak.file_size(handle).unwrap(), size);
        assert_eq!(pak.read_file(handle, 0, &mut buf).unwrap() as u64, size);
        assert_eq!(pak.entry(guid).unwrap().byte_offset() % BLOCK_SIZE, 0);
        pak.close_file(handle).unwrap();
    }

    let toc_len = pak.toc().unwrap().encoded_len() as u64;
    let file_len = file.as_file().metadata().unwrap().len();
    assert_eq!(file_len, pak.header().unwrap().total_size);
    assert!(file_len >= HEADER_SIZE as u64 + toc_len + 3 * BLOCK_SIZE);
    pak.verify().unwrap();
    pak.close().unwrap();
}

use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crystal_assets::pak::{self, TableOfContents, TocKind};
use crystal_assets::{
    AssetSource, DirectoryContentDatabase, HashedPak, ObjectGuid, OrdinalPak, PackageBuilder,
    PakFile, PakManifest, TypeRegistry,
};

const USAGE: &str = "Usage:
  crystal-pak build <asset-dir> <out.pak> [--hashed] [--session <tag>]
  crystal-pak list <file.pak>
  crystal-pak verify <file.pak>
  crystal-pak extract <file.pak> <key> <out-file>";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match CliCommand::parse(env::args().skip(1))? {
        CliCommand::Build {
            assets,
            out,
            hashed,
            session,
        } => build(&assets, &out, hashed, session),
        CliCommand::List { pak } => list(&pak),
        CliCommand::Verify { pak } => verify(&pak),
        CliCommand::Extract { pak, key, out } => extract(&pak, &key, &out),
    }
}

fn build(assets: &Path, out: &Path, hashed: bool, session: Option<u32>) -> Result<()> {
    let registry = TypeRegistry::builder()
        .build()
        .context("failed to build the type registry")?;
    let mut content = DirectoryContentDatabase::scan(assets)
        .with_context(|| format!("failed to scan {}", assets.display()))?;
    let guids: Vec<ObjectGuid> = content.assets().iter().map(|asset| asset.guid).collect();

    let mut builder = PackageBuilder::new(&registry, &mut content);
    if let Some(session) = session {
        builder = builder.with_session(session);
    }
    for guid in guids {
        builder.add_asset(guid)?;
    }

    let file = File::create(out).with_context(|| format!("unable to create {}", out.display()))?;
    let writer = BufWriter::new(file);
    let manifest = if hashed {
        builder.write_hashed(writer)
    } else {
        builder.write_ordinal(writer)
    }
    .with_context(|| format!("failed to write {}", out.display()))?;

    let manifest_path = manifest_path(out);
    manifest
        .save(&manifest_path)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    println!(
        "Packed {} assets from {} into {} ({})",
        manifest.entries.len(),
        content.root().display(),
        out.display(),
        if hashed { "hashed" } else { "ordinal" }
    );
    for entry in &manifest.entries {
        println!(" - [{}] {} {} ({} bytes)", entry.ordinal, entry.guid, entry.path, entry.size);
    }
    Ok(())
}

fn list(path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    match probe(path)? {
        TocKind::Ordinal => list_entries(&open::<pak::OrdinalToc>(path)?, |key| {
            manifest
                .as_ref()
                .and_then(|m| m.entries.iter().find(|entry| entry.ordinal == key))
                .map(|entry| entry.path.clone())
        }),
        TocKind::Hashed => list_entries(&open::<pak::HashedToc>(path)?, |key| {
            manifest
                .as_ref()
                .and_then(|m| m.entries.iter().find(|entry| entry.guid == key))
                .map(|entry| entry.path.clone())
        }),
    }
}

fn list_entries<T: TableOfContents>(
    pak: &PakFile<T>,
    path_of: impl Fn(T::Key) -> Option<String>,
) -> Result<()> {
    let header = pak.header()?;
    let toc = pak.toc()?;
    println!(
        "{} package: {} entries, {} bytes, session {:#010x}, modified {}",
        header.toc_kind,
        toc.len(),
        header.total_size,
        header.session,
        header.modified.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (key, entry) in toc.entries() {
        let path = path_of(key).unwrap_or_default();
        println!(
            " - {key} block {} size {} {path}",
            entry.block_offset, entry.size
        );
    }
    Ok(())
}

fn verify(path: &Path) -> Result<()> {
    let header = match probe(path)? {
        TocKind::Ordinal => verify_pak(open::<pak::OrdinalToc>(path)?),
        TocKind::Hashed => verify_pak(open::<pak::HashedToc>(path)?),
    }
    .with_context(|| format!("{} failed verification", path.display()))?;
    println!(
        "OK: {} ({} bytes, crc32 {:08x})",
        path.display(),
        header.total_size,
        header.crc32
    );
    Ok(())
}

fn verify_pak<T: TableOfContents>(mut pak: PakFile<T>) -> Result<pak::PakHeader> {
    pak.verify()?;
    Ok(pak.header()?.clone())
}

fn extract(path: &Path, key: &str, out: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    let by_path = manifest.as_ref().and_then(|m| m.find_by_path(key));
    let bytes = match probe(path)? {
        TocKind::Ordinal => {
            let ordinal = match key.parse::<u32>() {
                Ok(ordinal) => ordinal,
                Err(_) => by_path
                    .map(|entry| entry.ordinal)
                    .ok_or_else(|| anyhow!("{key} is neither an ordinal nor a packaged path"))?,
            };
            let mut pak: OrdinalPak = open(path)?;
            pak.read_to_vec(ordinal)
        }
        TocKind::Hashed => {
            let guid = match by_path {
                Some(entry) => entry.guid,
                None => key
                    .parse::<ObjectGuid>()
                    .unwrap_or_else(|_| ObjectGuid::from_path(key)),
            };
            let mut pak: HashedPak = open(path)?;
            pak.read_to_vec(guid)
        }
    }
    .with_context(|| format!("unable to read {key} from {}", path.display()))?;

    fs::write(out, &bytes).with_context(|| format!("unable to write {}", out.display()))?;
    println!("Extracted {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

fn probe(path: &Path) -> Result<TocKind> {
    let header = pak::read_header(path)
        .with_context(|| format!("unable to read package header from {}", path.display()))?;
    Ok(header.toc_kind)
}

fn open<T: TableOfContents>(path: &Path) -> Result<PakFile<T>> {
    let mut pak = PakFile::new();
    pak.open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    Ok(pak)
}

fn manifest_path(pak: &Path) -> PathBuf {
    let mut name = pak.as_os_str().to_owned();
    name.push(".manifest.json");
    PathBuf::from(name)
}

fn load_manifest(pak: &Path) -> Result<Option<PakManifest>> {
    let path = manifest_path(pak);
    if !path.exists() {
        return Ok(None);
    }
    PakManifest::load(&path)
        .map(Some)
        .with_context(|| format!("unable to read {}", path.display()))
}

enum CliCommand {
    Build {
        assets: PathBuf,
        out: PathBuf,
        hashed: bool,
        session: Option<u32>,
    },
    List {
        pak: PathBuf,
    },
    Verify {
        pak: PathBuf,
    },
    Extract {
        pak: PathBuf,
        key: String,
        out: PathBuf,
    },
}

impl CliCommand {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(command) = args.next() else {
            return Err(anyhow!("{USAGE}"));
        };
        let mut positional = Vec::new();
        let mut hashed = false;
        let mut session = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--hashed" if command == "build" => hashed = true,
                "--session" if command == "build" => {
                    let tag = args
                        .next()
                        .ok_or_else(|| anyhow!("--session expects a hex tag"))?;
                    let digits = tag.trim_start_matches("0x");
                    session = Some(
                        u32::from_str_radix(digits, 16)
                            .with_context(|| format!("invalid session tag {tag}"))?,
                    );
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                _ => positional.push(arg),
            }
        }

        let expected = match command.as_str() {
            "build" => 2,
            "extract" => 3,
            "list" | "verify" => 1,
            other => return Err(anyhow!("Unknown command: {other}\n{USAGE}")),
        };
        if positional.len() != expected {
            return Err(anyhow!(
                "{command} expects {expected} argument(s), got {}\n{USAGE}",
                positional.len()
            ));
        }

        let mut positional = positional.into_iter();
        let mut next = || positional.next().unwrap_or_default();
        Ok(match command.as_str() {
            "build" => Self::Build {
                assets: next().into(),
                out: next().into(),
                hashed,
                session,
            },
            "list" => Self::List { pak: next().into() },
            "verify" => Self::Verify { pak: next().into() },
            _ => Self::Extract {
                pak: next().into(),
                key: next(),
                out: next().into(),
            },
        })
    }
}

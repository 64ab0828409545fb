use clap::Args;
use hac::crypto::keyset::KeySet;
use hac::filesystem::merge_filesystem::MergeFilesystem;
use hac::formats::pfs::PartitionFileSystem;
use hac::package::{assemble_package, PackagePolicy, PackageSink};
use hac::snafu::{OptionExt, ResultExt, Whatever};
use hac::storage::FileRoStorage;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Opts {
    /// Directory to walk for `.nsp` files making up the source library.
    directory: PathBuf,
    /// Raw hex title id to extract (as printed by the `title-db`
    /// subcommand), e.g. 010079300ad54000.
    title_id: String,
    /// Which content-meta version to extract. Defaults to the newest one
    /// found for this title id.
    #[clap(long)]
    version: Option<u32>,
    /// Destination `.nsp` file.
    output: PathBuf,
}

/// The simplest possible [`PackageSink`]: a single local file, header
/// rewritten in place by seeking back to 0. `hac::output`'s sinks add
/// split-file rotation and free-space checks on top of exactly this
/// primitive for their respective output devices; a plain local dump has
/// neither concern.
struct LocalFileSink {
    file: File,
}

impl PackageSink for LocalFileSink {
    type Error = std::io::Error;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.file.write_all(bytes)
    }

    fn rewrite_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let pos = self.file.stream_position()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

pub fn main(opts: Opts) -> Result<(), Whatever> {
    let title_id = u64::from_str_radix(opts.title_id.trim_start_matches("0x"), 16)
        .whatever_context("Parsing title id as hex")?;

    let keys = KeySet::from_system(None).whatever_context("Loading system keyset")?;

    let files = walkdir::WalkDir::new(&opts.directory)
        .into_iter()
        .filter_map(|v| v.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().and_then(OsStr::to_str) == Some("nsp")
        })
        .map(|v| v.path().to_owned())
        .collect::<Vec<_>>();

    let filesystems = files
        .iter()
        .map(|filename| {
            let storage =
                FileRoStorage::open(filename).whatever_context("Opening NSP storage")?;
            PartitionFileSystem::new(storage).whatever_context("Opening NSP fs")
        })
        .collect::<Result<_, Whatever>>()?;

    let merged = MergeFilesystem::new(filesystems);
    let switch_fs =
        hac::switch_fs::SwitchFs::new(&keys, &merged).whatever_context("Opening SwitchFs")?;

    let mut candidates: Vec<_> = switch_fs
        .title_set()
        .iter()
        .filter(|(key, _)| key.id.value() == title_id)
        .collect();
    candidates.sort_by_key(|(key, _)| key.version);

    let (key, content) = match opts.version {
        Some(version) => candidates
            .into_iter()
            .find(|(key, _)| u32::from(key.version) == version)
            .whatever_context("No content-meta record at that exact version")?,
        None => candidates
            .into_iter()
            .last()
            .whatever_context("No content-meta record found for that title id")?,
    };

    println!(
        "Dumping title {} version {} ({:?}) to {}",
        key.id,
        key.version,
        key.ty,
        opts.output.display()
    );

    let file = File::create(&opts.output).whatever_context("Creating output file")?;
    let mut sink = LocalFileSink { file };

    assemble_package(
        &merged,
        &keys,
        content,
        &PackagePolicy::default(),
        None,
        None,
        &mut sink,
    )
    .whatever_context("Assembling package")?;

    let meta_content_id = content.common_info().meta_content_id;
    let xml = hac::xml::package_authoring_xml(key, meta_content_id);
    let xml_path = opts.output.with_extension("xml");
    std::fs::write(&xml_path, xml).whatever_context("Writing authoring-tool XML")?;
    println!("Wrote {}", xml_path.display());

    Ok(())
}

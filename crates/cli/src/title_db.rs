use clap::Args;
use hac::crypto::keyset::KeySet;
use hac::filesystem::merge_filesystem::MergeFilesystem;
use hac::formats::pfs::PartitionFileSystem;
use hac::snafu::{ResultExt, Whatever};
use hac::storage::FileRoStorage;
use hac::title_db::TitleDatabase;
use std::ffi::OsStr;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Opts {
    /// Directory to walk for `.nsp` files; all of them are merged into a
    /// single backend, the same way `nsp rename` and the switch_fs smoke
    /// test do.
    directory: PathBuf,
}

type MergedNsp = MergeFilesystem<PartitionFileSystem<FileRoStorage>>;

pub fn main(opts: Opts) -> Result<(), Whatever> {
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

    let merged = MergedNsp::new(filesystems);

    let db = TitleDatabase::<MergedNsp, MergedNsp, MergedNsp, MergedNsp>::build(
        &keys,
        None,
        Some(&merged),
        None,
        None,
    );

    println!("Applications found in {}:", opts.directory.display());
    // There's no direct "list every application" accessor on TitleDatabase
    // (it's keyed by lookup, matching the on-console API it mirrors), so we
    // walk the merged filesystem's own SwitchFs the same way the switch_fs
    // smoke test in junk.rs does, then cross-check each one through the
    // database's by-id lookup to exercise that query path too.
    let direct = hac::switch_fs::SwitchFs::new(&keys, &merged)
        .whatever_context("Opening merged SwitchFs")?;
    for application in direct.application_set().values() {
        let app_id = application.id;
        let title_matches = db.by_title_id(app_id.value());
        let resolved = db.application_set(app_id);
        println!(
            "  {} ({} content-meta record(s) at that raw id, resolved: {})",
            app_id,
            title_matches.len(),
            resolved.is_some()
        );
    }

    Ok(())
}

use clap::Args;
use hac::crypto::keyset::KeySet;
use hac::formats::cartridge::Cartridge;
use hac::snafu::{ResultExt, Whatever};
use hac::storage::FileRoStorage;
use std::path::PathBuf;

/// Inspects a cartridge dump. Real hardware exposes the normal and secure
/// storage areas as two separate service handles (their individual sizes
/// come from the console's filesystem service at dump time, not from
/// anything recoverable from the header alone), so a host-side dump tool
/// writes them out as two files; this subcommand takes the same two files
/// back in.
#[derive(Args, Debug)]
pub struct Opts {
    normal_area: PathBuf,
    secure_area: PathBuf,
    /// Also write an authoring-tool XML summary to this path.
    #[clap(long)]
    xml: Option<PathBuf>,
}

pub fn main(opts: Opts) -> Result<(), Whatever> {
    let keys = KeySet::from_system(None).whatever_context("Loading system keyset")?;

    let normal = FileRoStorage::open(&opts.normal_area).whatever_context("Opening normal area")?;
    let secure = FileRoStorage::open(&opts.secure_area).whatever_context("Opening secure area")?;

    let cartridge =
        Cartridge::open(&keys, normal, secure).whatever_context("Opening cartridge")?;

    let header = cartridge.header();
    println!("package_id:       {}", header.package_id);
    println!("rom_size:         {:?}", header.rom_size);
    println!("header_version:   {}", header.header_version);
    println!("total_size:       {:#x}", cartridge.total_size());
    println!("trimmed_size:     {:#x}", cartridge.trimmed_size());

    let card_info = cartridge.card_info();
    println!("card_info:        {:#?}", card_info);

    if let Some(xml_path) = &opts.xml {
        let xml = hac::xml::gamecard_authoring_xml(header, card_info);
        std::fs::write(xml_path, xml).whatever_context("Writing authoring-tool XML")?;
        println!("Wrote {}", xml_path.display());
    }

    Ok(())
}

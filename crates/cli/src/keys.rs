use clap::Args;
use hac::crypto::keyset::KeySet;
use hac::snafu::Whatever;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Opts {
    /// Path to a prod.keys-style file. Defaults to the usual system search
    /// path (~/.switch, the platform config dir) when omitted.
    #[clap(long)]
    keys_file: Option<PathBuf>,
}

pub fn main(opts: Opts) -> Result<(), Whatever> {
    use hac::snafu::ResultExt;

    let keys = KeySet::from_system(opts.keys_file.as_deref()).whatever_context("Loading keyset")?;
    let summary = keys.summarize();

    println!("header_key:        {}", summary.header_key);
    println!("title_kek:          {}/32", summary.title_kek_count);
    println!("key_area_key_application: {}/32", summary.key_area_key_application_count);
    println!("key_area_key_ocean: {}/32", summary.key_area_key_ocean_count);
    println!("key_area_key_system: {}/32", summary.key_area_key_system_count);
    println!("master_key:         {}/32", summary.master_key_count);
    println!("gc_cardinfo_key:    {}", summary.gc_cardinfo_key);
    println!("eticket_rsa_kek:    {}", summary.eticket_rsa_kek);
    println!("eticket_key:        {}", summary.eticket_key);
    println!("title_keys loaded:  {}", summary.title_key_count);

    Ok(())
}

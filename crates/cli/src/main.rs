use clap::{Parser, Subcommand};
use hac::snafu::ErrorCompat;

mod cartridge;
mod dump;
mod junk;
mod keys;
mod nsp;
mod title_db;

#[derive(Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    Nsp(nsp::Opts),
    Keys(keys::Opts),
    TitleDb(title_db::Opts),
    Cartridge(cartridge::Opts),
    Dump(dump::Opts),
    Junk,
}

fn main() {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    let result = match opts.action {
        Action::Nsp(opts) => nsp::main(opts),
        Action::Keys(opts) => keys::main(opts),
        Action::TitleDb(opts) => title_db::main(opts),
        Action::Cartridge(opts) => cartridge::main(opts),
        Action::Dump(opts) => dump::main(opts),
        Action::Junk => junk::main(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        eprintln!("Caused by:");
        for cause in e.iter_chain().skip(1) {
            eprintln!(" - {}", cause);
        }
    }
}

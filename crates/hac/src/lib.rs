pub use binrw;
pub use snafu;

mod brw_utils;
pub mod concurrency;
pub mod config;
pub mod crypto;
pub mod error;
pub mod filesystem;
pub mod formats;
mod hexstring;
pub mod ids;
pub mod output;
pub mod package;
pub mod storage;
pub mod switch_fs;
pub mod ticket_store;
pub mod title_db;
pub mod usb_protocol;
pub mod version;
pub mod xml;

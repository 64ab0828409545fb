use binrw::{BinRead, BinWrite};

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
pub struct HashFileSystemEntry {
    pub offset: u64,
    pub size: u64,
    pub name_offset: u32,
    pub hash_target_size: u32,
    pub hash_target_offset: u64,
    pub hash: [u8; 0x20],
}

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"HFS0")]
pub struct HashFileSystemHeader {
    pub entry_count: u32,
    pub name_table_size: u32,

    #[brw(pad_before = 4)] // reserved
    #[br(count = entry_count)]
    pub file_entries: Vec<HashFileSystemEntry>,

    #[br(count = name_table_size)]
    pub name_table: Vec<u8>,
}

use crate::crypto::{AesKey, AesXtsKey};
use crate::hexstring::HexData;
use crate::storage::block_transform_storage::BlockTransform;

/// AES-CTR over fixed-size blocks, the counter's low 64 bits offset by the
/// block index. `base_ctr` already has the NCA fs header's per-section upper
/// counter and starting-offset-in-blocks baked in (see
/// [`crate::formats::nca::NcaCryptStorage::new_ctr`]); CTR mode's keystream
/// is a pure function of the starting counter, so a bulk transform over many
/// blocks just needs the counter for the first one.
#[derive(Debug, Clone)]
pub struct AesCtrBlockTransform {
    key: AesKey,
    base_ctr: HexData<0x10>,
}

impl AesCtrBlockTransform {
    pub fn new(key: AesKey, base_ctr: HexData<0x10>) -> Self {
        Self { key, base_ctr }
    }

    fn ctr_for_block(&self, block_index: u64) -> [u8; 0x10] {
        let mut ctr = self.base_ctr.0;
        let counter = u64::from_be_bytes(ctr[8..].try_into().unwrap()).wrapping_add(block_index);
        ctr[8..].copy_from_slice(&counter.to_be_bytes());
        ctr
    }
}

impl BlockTransform for AesCtrBlockTransform {
    const BLOCK_SIZE: u64 = 0x10;

    fn transform_read(&self, block: &mut [u8], block_index: u64) {
        let ctr = self.ctr_for_block(block_index);
        self.key.decrypt_ctr(block, &ctr);
    }

    fn transform_write(&self, block: &mut [u8], block_index: u64) {
        let ctr = self.ctr_for_block(block_index);
        self.key.encrypt_ctr(block, &ctr);
    }
}

/// AES-XTS over 0x200-byte sectors, sector number offset by the block index.
/// `base_sector` is the section's starting byte offset divided by the sector
/// size, matching the Nintendo little-endian tweak convention in
/// [`super::super::super::crypto::AesXtsKey`].
#[derive(Debug, Clone)]
pub struct AesXtsBlockTransform {
    key: AesXtsKey,
    base_sector: u64,
}

impl AesXtsBlockTransform {
    pub fn new(key: AesXtsKey, base_sector: u64) -> Self {
        Self { key, base_sector }
    }
}

impl BlockTransform for AesXtsBlockTransform {
    const BLOCK_SIZE: u64 = 0x200;

    fn transform_read(&self, block: &mut [u8], block_index: u64) {
        let sector = self.base_sector + block_index;
        self.key
            .decrypt(block, sector as usize, Self::BLOCK_SIZE as usize);
    }

    fn transform_write(&self, block: &mut [u8], block_index: u64) {
        let sector = self.base_sector + block_index;
        self.key
            .encrypt(block, sector as usize, Self::BLOCK_SIZE as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctr_block_offset_wraps_into_the_counter_word() {
        let key = "00".repeat(0x10).parse::<AesKey>().unwrap();
        let base_ctr = HexData([0u8; 0x10]);
        let transform = AesCtrBlockTransform::new(key, base_ctr);

        let mut one_shot = [0xABu8; 0x20];
        transform.transform_read(&mut one_shot, 0);

        let mut first_block = [0xABu8; 0x10];
        transform.transform_read(&mut first_block, 0);
        let mut second_block = [0xABu8; 0x10];
        transform.transform_read(&mut second_block, 1);

        assert_eq!(&one_shot[..0x10], &first_block[..]);
        assert_eq!(&one_shot[0x10..], &second_block[..]);
    }
}

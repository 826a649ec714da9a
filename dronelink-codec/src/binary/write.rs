use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::binary::WordOrder;

/// Побитовая запись, старшие биты вперёд. Зеркало [`BitReader`].
///
/// [`BitReader`]: crate::binary::BitReader
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Незавершённый байт, биты прижаты к младшим разрядам
    cur: u8,
    cur_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Записывает младшие `n` бит значения `value`.
    pub fn write(
        &mut self,
        value: u32,
        n: u32,
    ) {
        debug_assert!(n <= 32);

        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_bit(
        &mut self,
        bit: bool,
    ) {
        self.cur = self.cur << 1 | u8::from(bit);
        self.cur_bits += 1;

        if self.cur_bits == 8 {
            self.bytes.push(self.cur);
            self.cur = 0;
            self.cur_bits = 0;
        }
    }

    /// Дополняет нулями до границы байта.
    pub fn align(&mut self) {
        while self.cur_bits != 0 {
            self.write_bit(false);
        }
    }

    pub fn bits_written(&self) -> u64 {
        self.bytes.len() as u64 * 8 + u64::from(self.cur_bits)
    }

    /// Байты потока с выравниванием по байту.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align();
        self.bytes
    }

    /// Байты потока, дополненные до целого слова и переставленные
    /// под заданный порядок слов.
    pub fn into_words(
        self,
        order: WordOrder,
    ) -> Vec<u8> {
        let mut bytes = self.into_bytes();
        bytes.resize(bytes.len().div_ceil(4) * 4, 0);

        if order == WordOrder::LittleEndian {
            for chunk in bytes.chunks_exact_mut(4) {
                let word = BigEndian::read_u32(chunk);
                LittleEndian::write_u32(chunk, word);
            }
        }

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::BitReader;

    #[test]
    fn test_write_msb_first() {
        let mut w = BitWriter::new();
        w.write(0b1, 1);
        w.write(0b010, 3);
        w.write(0xC5, 8);

        assert_eq!(w.bits_written(), 12);
        assert_eq!(w.into_bytes(), vec![0b1010_1100, 0b0101_0000]);
    }

    #[test]
    fn test_little_endian_words_read_back() {
        let mut w = BitWriter::new();
        w.write(0x20, 22);
        w.write(0b101, 3);
        w.write(0xABCD, 16);

        let bytes = w.into_words(WordOrder::LittleEndian);
        assert_eq!(bytes.len() % 4, 0);

        let mut r = BitReader::with_order(&bytes, WordOrder::LittleEndian);
        assert_eq!(r.read(22), 0x20);
        assert_eq!(r.read(3), 0b101);
        assert_eq!(r.read(16), 0xABCD);
    }
}

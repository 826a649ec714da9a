//! Побитовое чтение видеопотока.
//!
//! Биты выдаются старшими вперёд. Аккумулятор пополняется 32-битными
//! словами; за концом буфера читаются нули, так что энтропийный декодер
//! может заглядывать вперёд на фиксированное окно без проверок границ.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Максимальная ширина одного `peek`/`read`.
pub const MAX_READ_BITS: u32 = 32;

const WORD_BYTES: usize = 4;

/// Порядок байт в 32-битных словах пополнения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Курсор по одной неизменяемой датаграмме.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Смещение следующего слова для загрузки
    offset: usize,
    /// Младшие `bits_left` бит действительны
    acc: u64,
    bits_left: u32,
    /// Всего потреблено бит
    consumed: u64,
    order: WordOrder,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_order(data, WordOrder::BigEndian)
    }

    pub fn with_order(
        data: &'a [u8],
        order: WordOrder,
    ) -> Self {
        Self {
            data,
            offset: 0,
            acc: 0,
            bits_left: 0,
            consumed: 0,
            order,
        }
    }

    /// Следующие `n` бит без продвижения курсора.
    #[inline]
    pub fn peek(
        &mut self,
        n: u32,
    ) -> u32 {
        debug_assert!(n <= MAX_READ_BITS);

        if n == 0 {
            return 0;
        }

        self.refill();

        ((self.acc >> (self.bits_left - n)) & mask(n)) as u32
    }

    /// Читает `n` бит (не больше 32) и продвигает курсор.
    #[inline]
    pub fn read(
        &mut self,
        n: u32,
    ) -> u32 {
        let value = self.peek(n);
        self.consume(n);

        value
    }

    /// Пропускает `n` бит; `n` может быть больше 32.
    pub fn skip(
        &mut self,
        mut n: u32,
    ) {
        while n > 0 {
            let chunk = n.min(MAX_READ_BITS);
            self.refill();
            self.consume(chunk);
            n -= chunk;
        }
    }

    /// Выравнивает курсор на границу байта относительно прочитанного.
    pub fn align(&mut self) {
        let rem = (self.consumed % 8) as u32;

        if rem != 0 {
            self.skip(8 - rem);
        }
    }

    pub fn bits_read(&self) -> u64 {
        self.consumed
    }

    /// Курсор ушёл за конец данных (дальше читались нули).
    pub fn is_exhausted(&self) -> bool {
        self.consumed > self.data.len() as u64 * 8
    }

    #[inline]
    fn consume(
        &mut self,
        n: u32,
    ) {
        self.bits_left -= n;
        self.acc &= mask(self.bits_left);
        self.consumed += u64::from(n);
    }

    /// Гарантирует не меньше 33 действительных бит в аккумуляторе.
    #[inline]
    fn refill(&mut self) {
        while self.bits_left <= MAX_READ_BITS {
            let word = self.next_word();
            self.acc = (self.acc << 32) | u64::from(word);
            self.bits_left += 32;
        }
    }

    fn next_word(&mut self) -> u32 {
        let start = self.offset.min(self.data.len());
        let end = (self.offset + WORD_BYTES).min(self.data.len());
        self.offset += WORD_BYTES;

        let mut word = [0u8; WORD_BYTES];
        word[..end - start].copy_from_slice(&self.data[start..end]);

        match self.order {
            WordOrder::BigEndian => BigEndian::read_u32(&word),
            WordOrder::LittleEndian => LittleEndian::read_u32(&word),
        }
    }
}

#[inline]
fn mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_read_msb_first_across_bytes() {
        let data = [0b1010_1100, 0b0101_0011, 0xFF, 0x00];
        let mut r = BitReader::new(&data);

        assert_eq!(r.read(1), 1);
        assert_eq!(r.read(3), 0b010);
        assert_eq!(r.read(8), 0b1100_0101);
        assert_eq!(r.read(4), 0b0011);
        assert_eq!(r.read(16), 0xFF00);
        assert_eq!(r.bits_read(), 32);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x12];
        let mut r = BitReader::new(&data);

        assert_eq!(r.peek(16), 0xDEAD);
        assert_eq!(r.peek(32), 0xDEADBEEF);
        assert_eq!(r.bits_read(), 0);

        r.skip(4);
        assert_eq!(r.peek(32), 0xEADBEEF1);
    }

    #[test]
    fn test_past_end_reads_zero() {
        let data = [0xFF, 0xFF];
        let mut r = BitReader::new(&data);

        assert_eq!(r.read(12), 0xFFF);
        assert_eq!(r.read(8), 0xF0);
        assert_eq!(r.read(32), 0);
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_empty_buffer() {
        let mut r = BitReader::new(&[]);

        assert_eq!(r.read(22), 0);
        assert_eq!(r.peek(32), 0);
    }

    #[test]
    fn test_align_relative_to_consumed() {
        let data = [0x80, 0xAB, 0xCD];
        let mut r = BitReader::new(&data);

        assert_eq!(r.read(1), 1);
        r.align();
        assert_eq!(r.bits_read(), 8);
        r.align();
        assert_eq!(r.bits_read(), 8);
        assert_eq!(r.read(8), 0xAB);
    }

    #[test]
    fn test_little_endian_words() {
        let data = [0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE];
        let mut r = BitReader::with_order(&data, WordOrder::LittleEndian);

        assert_eq!(r.read(32), 0x1234_5678);
        // неполное слово дополняется нулями в байтовом виде
        assert_eq!(r.read(32), 0x0000_BEEF);
    }

    #[test]
    fn test_skip_longer_than_word() {
        let data = [0u8, 0, 0, 0, 0, 0, 0, 0b0000_0101];
        let mut r = BitReader::new(&data);

        r.skip(61);
        assert_eq!(r.read(3), 0b101);
    }

    #[test]
    fn test_random_split_reassembles_bits() {
        let mut rng = StdRng::seed_from_u64(0x5EED);

        for _ in 0..200 {
            let len = rng.gen_range(0..64);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let total = data.len() * 8;

            let mut r = BitReader::new(&data);
            let mut bits = Vec::with_capacity(total);

            while bits.len() < total {
                let n = rng.gen_range(1..=32u32).min((total - bits.len()) as u32);
                let v = r.read(n);
                for i in (0..n).rev() {
                    bits.push((v >> i) & 1 == 1);
                }
            }

            let rebuilt: Vec<u8> = bits
                .chunks(8)
                .map(|c| c.iter().fold(0u8, |acc, b| acc << 1 | u8::from(*b)))
                .collect();

            assert_eq!(rebuilt, data);
            assert_eq!(r.bits_read(), total as u64);
        }
    }
}

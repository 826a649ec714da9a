//! Константные таблицы кодека и таблицы быстрого энтропийного поиска.
//!
//! Таблицы длин серий (12 бит) и значений коэффициентов (15 бит) строятся
//! один раз прогоном того же правила разбора по всем возможным окнам.

use std::sync::OnceLock;

/// Коэффициентов в блоке 8×8.
pub const BLOCK_SIZE: usize = 64;

/// Ширина окна таблицы серий нулей.
pub const RUN_BITS: u32 = 12;
pub const RUN_TABLE_SIZE: usize = 1 << RUN_BITS;

/// Ширина окна таблицы значений.
pub const LEVEL_BITS: u32 = 15;
pub const LEVEL_TABLE_SIZE: usize = 1 << LEVEL_BITS;

/// Порядок передачи коэффициентов: индекс зигзага -> естественная позиция.
pub const ZIGZAG: [usize; BLOCK_SIZE] = [
    0, 1, 8, 16, 9, 2, 3, 10, //
    17, 24, 32, 25, 18, 11, 4, 5, //
    12, 19, 26, 33, 40, 48, 41, 34, //
    27, 20, 13, 6, 7, 14, 21, 28, //
    35, 42, 49, 56, 57, 50, 43, 36, //
    29, 22, 15, 23, 30, 37, 44, 51, //
    58, 59, 52, 45, 38, 31, 39, 46, //
    53, 60, 61, 54, 47, 55, 62, 63, //
];

/// Матрица квантования по естественной позиции: `3 + 2·(строка + столбец)`.
pub const QUANT: [i32; BLOCK_SIZE] = build_quant();

/// Блочный индекс яркости (4 квадранта по 64) -> растровый индекс в 16×16.
pub const LUMA_REMAP: [u16; 256] = build_luma_remap();

/// Блочный индекс яркости -> индекс отсчёта цветности 8×8 (2× ближайший сосед).
pub const CHROMA_UPSAMPLE: [u8; 256] = build_chroma_upsample();

/// Запись таблицы серий. `len == 0` — код не помещается в окно.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunEntry {
    pub len: u8,
    pub run: u8,
}

/// Запись таблицы значений. `len == 0` — код не помещается в окно.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelEntry {
    pub len: u8,
    pub value: i16,
    /// Конец блока
    pub eob: bool,
}

static RUN_TABLE: OnceLock<Box<[RunEntry]>> = OnceLock::new();
static LEVEL_TABLE: OnceLock<Box<[LevelEntry]>> = OnceLock::new();

/// Таблица серий, индекс — следующие 12 бит потока.
pub fn run_table() -> &'static [RunEntry] {
    RUN_TABLE.get_or_init(|| (0..RUN_TABLE_SIZE as u32).map(decode_run_bits).collect())
}

/// Таблица значений, индекс — следующие 15 бит потока.
pub fn level_table() -> &'static [LevelEntry] {
    LEVEL_TABLE.get_or_init(|| {
        (0..LEVEL_TABLE_SIZE as u32)
            .map(decode_level_bits)
            .collect()
    })
}

/// Строит обе таблицы заранее, чтобы первый кадр не платил за это.
pub fn warm_up_tables() {
    let _ = run_table();
    let _ = level_table();
}

/// Разбор кода серии в 12-битном окне (старший бит — первый).
///
/// `z` нулей, затем `1`, затем `z - 1` дополнительных бит при `z >= 2`.
pub fn decode_run_bits(window: u32) -> RunEntry {
    let window = window & window_mask(RUN_BITS);
    let z = leading_zeros_in(window, RUN_BITS);

    match z {
        0 => RunEntry { len: 1, run: 0 },
        1 => RunEntry { len: 2, run: 1 },
        _ => {
            let len = 2 * z;
            if len > RUN_BITS {
                return RunEntry::default();
            }

            let extra = (window >> (RUN_BITS - len)) & window_mask(z - 1);

            RunEntry {
                len: len as u8,
                run: ((1 << (z - 1)) | extra) as u8,
            }
        }
    }
}

/// Разбор кода значения в 15-битном окне.
///
/// `1s` — модуль 1; `01` — конец блока; иначе `z` нулей, `1`,
/// `z - 1` дополнительных бит и бит знака. Знак `1` — отрицательное.
pub fn decode_level_bits(window: u32) -> LevelEntry {
    let window = window & window_mask(LEVEL_BITS);
    let z = leading_zeros_in(window, LEVEL_BITS);

    let (len, magnitude) = match z {
        0 => (2, 1),
        1 => {
            return LevelEntry {
                len: 2,
                value: 0,
                eob: true,
            }
        }
        _ => {
            let len = 2 * z + 1;
            if len > LEVEL_BITS {
                return LevelEntry::default();
            }

            let extra = (window >> (LEVEL_BITS - 2 * z)) & window_mask(z - 1);

            (len, (1 << (z - 1)) | extra)
        }
    };

    let sign = (window >> (LEVEL_BITS - len)) & 1;
    let value = if sign == 1 {
        -(magnitude as i16)
    } else {
        magnitude as i16
    };

    LevelEntry {
        len: len as u8,
        value,
        eob: false,
    }
}

/// Количество ведущих нулей в `width`-битном значении.
#[inline]
fn leading_zeros_in(
    value: u32,
    width: u32,
) -> u32 {
    (value << (32 - width)).leading_zeros().min(width)
}

#[inline]
const fn window_mask(n: u32) -> u32 {
    (1 << n) - 1
}

const fn build_quant() -> [i32; BLOCK_SIZE] {
    let mut t = [0; BLOCK_SIZE];
    let mut i = 0;
    while i < BLOCK_SIZE {
        t[i] = 3 + 2 * ((i / 8) + (i % 8)) as i32;
        i += 1;
    }
    t
}

const fn build_luma_remap() -> [u16; 256] {
    let mut t = [0; 256];
    let mut i = 0;
    while i < 256 {
        let (b, p) = (i / 64, i % 64);
        let (r, c) = (p / 8, p % 8);
        t[i] = ((r + 8 * (b / 2)) * 16 + c + 8 * (b % 2)) as u16;
        i += 1;
    }
    t
}

const fn build_chroma_upsample() -> [u8; 256] {
    let mut t = [0; 256];
    let mut i = 0;
    while i < 256 {
        let (b, p) = (i / 64, i % 64);
        let (r, c) = (p / 8, p % 8);
        t[i] = ((r / 2 + 4 * (b / 2)) * 8 + c / 2 + 4 * (b % 2)) as u8;
        i += 1;
    }
    t
}

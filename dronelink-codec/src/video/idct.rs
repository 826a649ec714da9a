//! Целочисленное обратное ДКП 8×8 (разделимое, 13 бит точности констант,
//! 1 бит масштабирования промежуточного прохода).

use crate::video::tables::BLOCK_SIZE;

const CONST_BITS: u32 = 13;
const PASS1_BITS: u32 = 1;

const FIX_0_298631336: i64 = 2446;
const FIX_0_390180644: i64 = 3196;
const FIX_0_541196100: i64 = 4433;
const FIX_0_765366865: i64 = 6270;
const FIX_0_899976223: i64 = 7373;
const FIX_1_175875602: i64 = 9633;
const FIX_1_501321110: i64 = 12299;
const FIX_1_847759065: i64 = 15137;
const FIX_1_961570560: i64 = 16069;
const FIX_2_053119869: i64 = 16819;
const FIX_2_562915447: i64 = 20995;
const FIX_3_072711026: i64 = 25172;

/// Деление на `2^n` с округлением к ближайшему.
#[inline(always)]
fn descale(
    x: i64,
    n: u32,
) -> i64 {
    (x + (1 << (n - 1))) >> n
}

/// Одномерное ядро: 8 входов -> 8 выходов, масштабированных на `2^CONST_BITS`.
#[inline(always)]
fn kernel(s: [i64; 8]) -> [i64; 8] {
    // чётная часть
    let z1 = (s[2] + s[6]) * FIX_0_541196100;
    let tmp2 = z1 - s[6] * FIX_1_847759065;
    let tmp3 = z1 + s[2] * FIX_0_765366865;

    let tmp0 = (s[0] + s[4]) << CONST_BITS;
    let tmp1 = (s[0] - s[4]) << CONST_BITS;

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    // нечётная часть
    let (o0, o1, o2, o3) = (s[7], s[5], s[3], s[1]);

    let z1 = o0 + o3;
    let z2 = o1 + o2;
    let z3 = o0 + o2;
    let z4 = o1 + o3;
    let z5 = (z3 + z4) * FIX_1_175875602;

    let o0 = o0 * FIX_0_298631336;
    let o1 = o1 * FIX_2_053119869;
    let o2 = o2 * FIX_3_072711026;
    let o3 = o3 * FIX_1_501321110;

    let z1 = -z1 * FIX_0_899976223;
    let z2 = -z2 * FIX_2_562915447;
    let z3 = -z3 * FIX_1_961570560 + z5;
    let z4 = -z4 * FIX_0_390180644 + z5;

    let o0 = o0 + z1 + z3;
    let o1 = o1 + z2 + z4;
    let o2 = o2 + z2 + z3;
    let o3 = o3 + z1 + z4;

    [
        tmp10 + o3,
        tmp11 + o2,
        tmp12 + o1,
        tmp13 + o0,
        tmp13 - o0,
        tmp12 - o1,
        tmp11 - o2,
        tmp10 - o3,
    ]
}

/// Полное обратное ДКП: деквантованные коэффициенты в естественном
/// порядке -> 64 пространственных остатка.
pub fn idct(coeffs: &[i32; BLOCK_SIZE]) -> [i32; BLOCK_SIZE] {
    let mut ws = [0i64; BLOCK_SIZE];

    // проход 1: столбцы
    for col in 0..8 {
        let s: [i64; 8] = std::array::from_fn(|row| i64::from(coeffs[row * 8 + col]));

        if s[1..].iter().all(|v| *v == 0) {
            let dc = s[0] << PASS1_BITS;
            for row in 0..8 {
                ws[row * 8 + col] = dc;
            }
            continue;
        }

        let out = kernel(s);
        for row in 0..8 {
            ws[row * 8 + col] = descale(out[row], CONST_BITS - PASS1_BITS);
        }
    }

    // проход 2: строки
    let mut block = [0i32; BLOCK_SIZE];
    for row in 0..8 {
        let s: [i64; 8] = std::array::from_fn(|col| ws[row * 8 + col]);
        let out = kernel(s);

        for col in 0..8 {
            block[row * 8 + col] = descale(out[col], CONST_BITS + PASS1_BITS + 3) as i32;
        }
    }

    block
}

/// Быстрый путь для блока без AC: все 64 отсчёта равны `(dc + 4) >> 3`.
#[inline]
pub fn idct_dc_only(dc: i32) -> [i32; BLOCK_SIZE] {
    [(dc + 4) >> 3; BLOCK_SIZE]
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn float_idct(coeffs: &[i32; BLOCK_SIZE]) -> [f64; BLOCK_SIZE] {
        let c = |u: usize| if u == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        let mut out = [0.0; BLOCK_SIZE];

        for y in 0..8 {
            for x in 0..8 {
                let mut sum = 0.0;
                for v in 0..8 {
                    for u in 0..8 {
                        sum += c(u)
                            * c(v)
                            * f64::from(coeffs[v * 8 + u])
                            * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos()
                            * (((2 * y + 1) as f64 * v as f64 * PI) / 16.0).cos();
                    }
                }
                out[y * 8 + x] = sum / 4.0;
            }
        }

        out
    }

    #[test]
    fn test_dc_only_matches_full_transform() {
        for dc in [-1024, -3, 0, 1, 4, 5, 1023, 1200, 3069] {
            let mut coeffs = [0; BLOCK_SIZE];
            coeffs[0] = dc;

            assert_eq!(idct(&coeffs), idct_dc_only(dc), "dc = {dc}");
        }
    }

    #[test]
    fn test_dc_only_values() {
        assert_eq!(idct_dc_only(1200)[0], 150);
        assert_eq!(idct_dc_only(1023)[63], 128);
        assert_eq!(idct_dc_only(0)[10], 0);
    }

    #[test]
    fn test_close_to_float_reference() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let mut coeffs = [0; BLOCK_SIZE];
            for _ in 0..rng.gen_range(1..12) {
                coeffs[rng.gen_range(0..BLOCK_SIZE)] = rng.gen_range(-300..=300);
            }

            let fixed = idct(&coeffs);
            let float = float_idct(&coeffs);

            for i in 0..BLOCK_SIZE {
                let diff = (f64::from(fixed[i]) - float[i]).abs();
                assert!(diff < 1.5, "pos {i}: {} vs {:.3}", fixed[i], float[i]);
            }
        }
    }
}

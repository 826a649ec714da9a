use dronelink_types::{VideoError, VideoResult};

use crate::{
    binary::BitReader,
    video::tables::{level_table, run_table, BLOCK_SIZE, LEVEL_BITS, QUANT, RUN_BITS, ZIGZAG},
};

/// Ширина DC-коэффициента в битах.
pub const DC_BITS: u32 = 10;

/// Деквантованный блок в естественном порядке.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoefficientBlock {
    pub coeffs: [i32; BLOCK_SIZE],
    /// В блоке есть хотя бы одна пара (серия, значение)
    pub has_ac: bool,
}

/// Декодирует один блок 8×8: 10-битный DC и, если `coded`, пары
/// (серия нулей, значение) до кода конца блока.
pub fn decode_block(
    reader: &mut BitReader<'_>,
    coded: bool,
) -> VideoResult<CoefficientBlock> {
    let mut coeffs = [0i32; BLOCK_SIZE];
    coeffs[0] = reader.read(DC_BITS) as i32 * QUANT[0];

    let mut has_ac = false;

    if coded {
        let runs = run_table();
        let levels = level_table();
        let mut index = 1usize;

        loop {
            let window = reader.peek(32);

            let run_code = window >> (32 - RUN_BITS);
            let run = runs[run_code as usize];
            if run.len == 0 {
                return Err(VideoError::InvalidRunCode(run_code));
            }

            let level_code = (window >> (32 - LEVEL_BITS - u32::from(run.len))) & 0x7FFF;
            let level = levels[level_code as usize];
            if level.len == 0 {
                return Err(VideoError::InvalidLevelCode(level_code));
            }

            reader.skip(u32::from(run.len) + u32::from(level.len));

            if level.eob {
                break;
            }

            index += usize::from(run.run);
            if index >= BLOCK_SIZE {
                return Err(VideoError::CoefficientOverrun(index));
            }

            let pos = ZIGZAG[index];
            coeffs[pos] = i32::from(level.value) * QUANT[pos];
            has_ac = true;
            index += 1;
        }
    }

    Ok(CoefficientBlock { coeffs, has_ac })
}

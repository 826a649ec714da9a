//! Макроблок 16×16: разбор дескриптора, шесть блоков, YCbCr -> RGB.

use dronelink_types::{VideoError, VideoResult, RGB_BYTES_PER_PIXEL};

use crate::{
    binary::BitReader,
    video::{
        entropy::decode_block,
        idct::{idct, idct_dc_only},
        tables::{BLOCK_SIZE, CHROMA_UPSAMPLE, LUMA_REMAP},
    },
};

/// Сторона макроблока в пикселях.
pub const MACROBLOCK_SIZE: usize = 16;

/// 4 яркостных + Cb + Cr.
pub const BLOCKS_PER_MACROBLOCK: usize = 6;

const DESCRIPTOR_MARKER: u8 = 0x80;
const DESCRIPTOR_DIFF: u8 = 0x40;

/// Декодированный макроблок: остатки после обратного ДКП.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macroblock {
    /// `false` — макроблок пропущен и ничего не рисует
    pub coded: bool,
    /// Биты 0–3 — яркость, 4 — Cb, 5 — Cr
    pub block_flags: u8,
    pub blocks: [[i32; BLOCK_SIZE]; BLOCKS_PER_MACROBLOCK],
}

impl Macroblock {
    pub fn skipped() -> Self {
        Self {
            coded: false,
            block_flags: 0,
            blocks: [[0; BLOCK_SIZE]; BLOCKS_PER_MACROBLOCK],
        }
    }

    pub fn luma(
        &self,
        index: usize,
    ) -> &[i32; BLOCK_SIZE] {
        &self.blocks[index]
    }

    pub fn cb(&self) -> &[i32; BLOCK_SIZE] {
        &self.blocks[4]
    }

    pub fn cr(&self) -> &[i32; BLOCK_SIZE] {
        &self.blocks[5]
    }
}

/// Читает один макроблок из потока.
pub fn read_macroblock(reader: &mut BitReader<'_>) -> VideoResult<Macroblock> {
    // 1 — макроблок не закодирован
    if reader.read(1) == 1 {
        return Ok(Macroblock::skipped());
    }

    let descriptor = reader.read(8) as u8;
    if descriptor & DESCRIPTOR_MARKER == 0 {
        return Err(VideoError::InvalidMacroblock(descriptor));
    }
    if descriptor & DESCRIPTOR_DIFF != 0 {
        // дифференциальный квантователь не используется
        reader.skip(2);
    }

    let mut mb = Macroblock {
        coded: true,
        block_flags: descriptor & 0x3F,
        blocks: [[0; BLOCK_SIZE]; BLOCKS_PER_MACROBLOCK],
    };

    for (i, out) in mb.blocks.iter_mut().enumerate() {
        let block = decode_block(reader, descriptor >> i & 1 == 1)?;

        *out = if block.has_ac {
            idct(&block.coeffs)
        } else {
            idct_dc_only(block.coeffs[0])
        };
    }

    Ok(mb)
}

/// Целочисленное YCbCr (BT.601, студийный диапазон) -> RGB.
#[inline]
pub fn ycbcr_to_rgb(
    y: i32,
    cb: i32,
    cr: i32,
) -> [u8; 3] {
    let y = 298 * (y - 16);
    let cb = cb - 128;
    let cr = cr - 128;

    let clamp = |v: i32| ((v + 128) >> 8).clamp(0, 255) as u8;

    [
        clamp(y + 409 * cr),
        clamp(y - 100 * cb - 208 * cr),
        clamp(y + 516 * cb),
    ]
}

/// Пишет макроблок в RGB-буфер кадра шириной `width` пикселей.
///
/// Пропущенный макроблок ничего не меняет. Пиксели за краем кадра
/// отбрасываются.
pub fn write_rgb(
    mb: &Macroblock,
    rgb: &mut [u8],
    width: usize,
    mb_x: usize,
    mb_y: usize,
) {
    if !mb.coded || width == 0 {
        return;
    }

    let height = rgb.len() / (width * RGB_BYTES_PER_PIXEL);
    let (x0, y0) = (mb_x * MACROBLOCK_SIZE, mb_y * MACROBLOCK_SIZE);

    for i in 0..256 {
        let raster = usize::from(LUMA_REMAP[i]);
        let (x, y) = (x0 + raster % MACROBLOCK_SIZE, y0 + raster / MACROBLOCK_SIZE);
        if x >= width || y >= height {
            continue;
        }

        let chroma = usize::from(CHROMA_UPSAMPLE[i]);
        let px = ycbcr_to_rgb(
            mb.blocks[i / BLOCK_SIZE][i % BLOCK_SIZE],
            mb.cb()[chroma],
            mb.cr()[chroma],
        );

        let off = (y * width + x) * RGB_BYTES_PER_PIXEL;
        rgb[off..off + RGB_BYTES_PER_PIXEL].copy_from_slice(&px);
    }
}

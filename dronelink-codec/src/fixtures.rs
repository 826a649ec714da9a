//! Синтетические потоки для тестов и бенчмарков: корректный видеопоток
//! заданной раскладки и датаграммы navdata.

use byteorder::{ByteOrder, LittleEndian};
use dronelink_types::{PictureFormat, NAVDATA_MAGIC};

use crate::{
    binary::{BitWriter, WordOrder},
    navdata::{navdata_checksum, CHECKSUM_OPTION_ID, DEMO_OPTION_ID, OPTION_HEADER_SIZE},
    video::{
        decoder::{PICTURE_END_CODE, PICTURE_START_CODE},
        entropy::DC_BITS,
        macroblock::{BLOCKS_PER_MACROBLOCK, MACROBLOCK_SIZE},
    },
};

////////////////////////////////////////////////////////////////////////////////
// Видео
////////////////////////////////////////////////////////////////////////////////

/// Код серии нулей (0..=63).
pub fn write_run(
    w: &mut BitWriter,
    run: u8,
) {
    let run = u32::from(run);
    let z = 32 - run.leading_zeros();

    w.write(0, z);
    w.write_bit(true);
    if z >= 2 {
        w.write(run, z - 1);
    }
}

/// Код ненулевого значения, модуль 1..=127.
pub fn write_level(
    w: &mut BitWriter,
    level: i16,
) {
    let magnitude = u32::from(level.unsigned_abs());
    let negative = level < 0;

    if magnitude == 1 {
        w.write_bit(true);
    } else {
        let z = 32 - magnitude.leading_zeros();
        w.write(0, z);
        w.write_bit(true);
        w.write(magnitude, z - 1);
    }

    w.write_bit(negative);
}

/// Конец блока: серия 0 и код `01`.
pub fn write_eob(w: &mut BitWriter) {
    write_run(w, 0);
    w.write(0b01, 2);
}

/// Блок 8×8: DC и пары (серия, значение).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSpec {
    pub dc: u16,
    pub ac: Vec<(u8, i16)>,
}

impl BlockSpec {
    pub fn dc(dc: u16) -> Self {
        Self { dc, ac: Vec::new() }
    }

    pub fn with_ac(
        dc: u16,
        ac: Vec<(u8, i16)>,
    ) -> Self {
        Self { dc, ac }
    }

    pub fn write(
        &self,
        w: &mut BitWriter,
    ) {
        w.write(u32::from(self.dc), DC_BITS);

        if !self.ac.is_empty() {
            for (run, level) in &self.ac {
                write_run(w, *run);
                write_level(w, *level);
            }
            write_eob(w);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MacroblockSpec {
    #[default]
    Skipped,
    Coded {
        blocks: [BlockSpec; BLOCKS_PER_MACROBLOCK],
    },
}

impl MacroblockSpec {
    /// Все четыре яркостных блока с одним DC, цветность — с другими.
    pub fn uniform(
        y_dc: u16,
        cb_dc: u16,
        cr_dc: u16,
    ) -> Self {
        let y = BlockSpec::dc(y_dc);

        MacroblockSpec::Coded {
            blocks: [
                y.clone(),
                y.clone(),
                y.clone(),
                y,
                BlockSpec::dc(cb_dc),
                BlockSpec::dc(cr_dc),
            ],
        }
    }

    pub fn write(
        &self,
        w: &mut BitWriter,
    ) {
        match self {
            MacroblockSpec::Skipped => w.write_bit(true),
            MacroblockSpec::Coded { blocks } => {
                let flags = blocks
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| !b.ac.is_empty())
                    .fold(0u32, |acc, (i, _)| acc | 1 << i);

                w.write_bit(false);
                w.write(0x80 | flags, 8);
                for block in blocks {
                    block.write(w);
                }
            }
        }
    }
}

/// Сборщик корректного кадра. По умолчанию все макроблоки пропущены.
#[derive(Debug, Clone)]
pub struct PictureBuilder {
    format: PictureFormat,
    resolution: u8,
    picture_type: u8,
    quant: u8,
    frame_number: u32,
    slices: usize,
    per_slice: usize,
    macroblocks: Vec<MacroblockSpec>,
}

impl PictureBuilder {
    pub fn new(
        format: PictureFormat,
        resolution: u8,
    ) -> Self {
        let (width, height) = format.dimensions(resolution).unwrap_or_default();
        let slices = height as usize / MACROBLOCK_SIZE;
        let per_slice = width as usize / MACROBLOCK_SIZE;

        Self {
            format,
            resolution,
            picture_type: 0,
            quant: 6,
            frame_number: 0,
            slices,
            per_slice,
            macroblocks: vec![MacroblockSpec::Skipped; slices * per_slice],
        }
    }

    pub fn frame_number(
        mut self,
        frame_number: u32,
    ) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn fill(
        mut self,
        spec: MacroblockSpec,
    ) -> Self {
        self.macroblocks.fill(spec);
        self
    }

    pub fn set(
        mut self,
        slice: usize,
        index: usize,
        spec: MacroblockSpec,
    ) -> Self {
        if let Some(mb) = self.macroblocks.get_mut(slice * self.per_slice + index) {
            *mb = spec;
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.write().into_bytes()
    }

    pub fn build_with_order(
        &self,
        order: WordOrder,
    ) -> Vec<u8> {
        self.write().into_words(order)
    }

    fn write(&self) -> BitWriter {
        let mut w = BitWriter::new();

        w.write(PICTURE_START_CODE, 22);
        w.write(u32::from(self.format.as_code()), 2);
        w.write(u32::from(self.resolution), 3);
        w.write(u32::from(self.picture_type), 3);
        w.write(u32::from(self.quant), 5);
        w.write(self.frame_number, 32);

        for slice in 0..self.slices {
            if slice > 0 {
                w.align();
                // номер слайса в младших битах, не совпадая с кодом конца
                w.write(0x20 | (slice as u32 % 31), 22);
                w.write(u32::from(self.quant), 5);
            }

            let row = &self.macroblocks[slice * self.per_slice..(slice + 1) * self.per_slice];
            for mb in row {
                mb.write(&mut w);
            }
        }

        w.align();
        w.write(PICTURE_END_CODE, 22);

        w
    }
}

////////////////////////////////////////////////////////////////////////////////
// Navdata
////////////////////////////////////////////////////////////////////////////////

/// Поля опции demo в сыром виде (углы в тысячных долях градуса).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DemoFields {
    pub ctrl_state: u32,
    pub battery: u32,
    pub theta: f32,
    pub phi: f32,
    pub psi: f32,
    pub altitude: i32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub num_frames: u32,
}

impl DemoFields {
    pub fn to_payload(&self) -> Vec<u8> {
        let mut p = vec![0u8; 40];

        LittleEndian::write_u32(&mut p[0..4], self.ctrl_state);
        LittleEndian::write_u32(&mut p[4..8], self.battery);
        LittleEndian::write_f32(&mut p[8..12], self.theta);
        LittleEndian::write_f32(&mut p[12..16], self.phi);
        LittleEndian::write_f32(&mut p[16..20], self.psi);
        LittleEndian::write_i32(&mut p[20..24], self.altitude);
        LittleEndian::write_f32(&mut p[24..28], self.vx);
        LittleEndian::write_f32(&mut p[28..32], self.vy);
        LittleEndian::write_f32(&mut p[32..36], self.vz);
        LittleEndian::write_u32(&mut p[36..40], self.num_frames);

        p
    }
}

/// Сборщик датаграммы navdata.
#[derive(Debug, Clone, Default)]
pub struct NavdataBuilder {
    state: u32,
    sequence: u32,
    vision_flag: u32,
    options: Vec<(u16, Vec<u8>)>,
    checksum: bool,
}

impl NavdataBuilder {
    pub fn new(
        state: u32,
        sequence: u32,
    ) -> Self {
        Self {
            state,
            sequence,
            ..Self::default()
        }
    }

    pub fn vision_flag(
        mut self,
        flag: u32,
    ) -> Self {
        self.vision_flag = flag;
        self
    }

    pub fn demo(
        self,
        fields: DemoFields,
    ) -> Self {
        self.option(DEMO_OPTION_ID, fields.to_payload())
    }

    pub fn option(
        mut self,
        id: u16,
        payload: Vec<u8>,
    ) -> Self {
        self.options.push((id, payload));
        self
    }

    /// Добавляет опцию контрольной суммы последней.
    pub fn checksum(mut self) -> Self {
        self.checksum = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64);
        let mut word = [0u8; 4];

        for value in [NAVDATA_MAGIC, self.state, self.sequence, self.vision_flag] {
            LittleEndian::write_u32(&mut word, value);
            data.extend_from_slice(&word);
        }

        for (id, payload) in &self.options {
            push_option(&mut data, *id, payload);
        }

        if self.checksum {
            let mut sum = [0u8; 4];
            LittleEndian::write_u32(&mut sum, navdata_checksum(&data));
            push_option(&mut data, CHECKSUM_OPTION_ID, &sum);
        }

        data
    }
}

fn push_option(
    data: &mut Vec<u8>,
    id: u16,
    payload: &[u8],
) {
    let mut head = [0u8; OPTION_HEADER_SIZE];
    LittleEndian::write_u16(&mut head[0..2], id);
    LittleEndian::write_u16(&mut head[2..4], (payload.len() + OPTION_HEADER_SIZE) as u16);

    data.extend_from_slice(&head);
    data.extend_from_slice(payload);
}

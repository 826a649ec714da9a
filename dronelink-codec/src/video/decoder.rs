//! Разбор кадра: заголовок, GOB-слайсы, макроблоки, код конца кадра.
//!
//! Любая ошибка синхронизации или формата отбрасывает только текущую
//! датаграмму; ранее собранный кадр [`VideoDecoder`] не меняется.

use std::time::{Duration, Instant};

use dronelink_types::{Picture, PictureFormat, VideoError, VideoResult, RGB_BYTES_PER_PIXEL};
use log::trace;

use crate::{
    binary::{BitReader, WordOrder},
    video::macroblock::{read_macroblock, write_rgb, MACROBLOCK_SIZE},
};

/// 22-битный код начала кадра.
pub const PICTURE_START_CODE: u32 = 0x20;

/// 22-битный код конца кадра.
pub const PICTURE_END_CODE: u32 = 0x3F;

const SYNC_BITS: u32 = 22;

/// Заголовок кадра.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    pub format: PictureFormat,
    /// Множитель разрешения (1..=7)
    pub resolution: u8,
    pub width: u32,
    pub height: u32,
    pub picture_type: u8,
    pub quant: u8,
    pub frame_number: u32,
}

impl PictureHeader {
    /// Количество GOB-слайсов (строк макроблоков).
    pub fn slices(&self) -> usize {
        self.height as usize / MACROBLOCK_SIZE
    }

    pub fn macroblocks_per_slice(&self) -> usize {
        self.width as usize / MACROBLOCK_SIZE
    }
}

/// Состояние автомата разбора кадра.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    ExpectHeader,
    ExpectGob { slice: usize },
    ExpectMacroblock { slice: usize, index: usize },
    ExpectEnd,
    Done,
    Aborted,
}

/// Читает заголовок кадра, начиная с выравнивания на байт.
pub fn read_picture_header(reader: &mut BitReader<'_>) -> VideoResult<PictureHeader> {
    reader.align();

    let start = reader.read(SYNC_BITS);
    if start != PICTURE_START_CODE {
        return Err(VideoError::InvalidStartCode(start));
    }

    let format = PictureFormat::from_code(reader.read(2) as u8)?;
    let resolution = reader.read(3) as u8;
    let (width, height) = format.dimensions(resolution)?;

    let picture_type = reader.read(3) as u8;
    let quant = reader.read(5) as u8;
    let frame_number = reader.read(32);

    Ok(PictureHeader {
        format,
        resolution,
        width,
        height,
        picture_type,
        quant,
        frame_number,
    })
}

/// Пошаговый разбор одной датаграммы видео.
#[derive(Debug)]
pub struct PictureParser<'a> {
    reader: BitReader<'a>,
    state: DecodeState,
    header: Option<PictureHeader>,
    /// Квантователь последнего прочитанного GOB
    gob_quant: u8,
}

impl<'a> PictureParser<'a> {
    pub fn new(
        data: &'a [u8],
        order: WordOrder,
    ) -> Self {
        Self {
            reader: BitReader::with_order(data, order),
            state: DecodeState::ExpectHeader,
            header: None,
            gob_quant: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn header(&self) -> Option<&PictureHeader> {
        self.header.as_ref()
    }

    /// Квантователь текущего GOB (для первого — из заголовка).
    pub fn gob_quant(&self) -> u8 {
        self.gob_quant
    }

    pub fn bits_read(&self) -> u64 {
        self.reader.bits_read()
    }

    /// Разбирает заголовок; повторный вызов возвращает уже прочитанный.
    pub fn read_header(&mut self) -> VideoResult<PictureHeader> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        match read_picture_header(&mut self.reader) {
            Ok(header) => {
                trace!(
                    "Picture #{} {}x{} type={} quant={}",
                    header.frame_number,
                    header.width,
                    header.height,
                    header.picture_type,
                    header.quant
                );

                self.header = Some(header);
                self.gob_quant = header.quant;
                self.state = if header.slices() == 0 || header.macroblocks_per_slice() == 0 {
                    DecodeState::ExpectEnd
                } else {
                    DecodeState::ExpectMacroblock { slice: 0, index: 0 }
                };

                Ok(header)
            }
            Err(e) => {
                self.state = DecodeState::Aborted;
                Err(e)
            }
        }
    }

    /// Один переход автомата. `rgb` — буфер кадра размера заголовка.
    pub fn step(
        &mut self,
        rgb: &mut [u8],
    ) -> VideoResult<DecodeState> {
        let result = self.advance(rgb);

        if result.is_err() {
            self.state = DecodeState::Aborted;
        }

        result
    }

    /// Прогоняет автомат до `Done`.
    pub fn decode_into(
        &mut self,
        rgb: &mut [u8],
    ) -> VideoResult<PictureHeader> {
        let header = self.read_header()?;

        while self.state != DecodeState::Done {
            self.step(rgb)?;
        }

        Ok(header)
    }

    fn advance(
        &mut self,
        rgb: &mut [u8],
    ) -> VideoResult<DecodeState> {
        let next = match self.state {
            DecodeState::ExpectHeader => {
                self.read_header()?;
                self.state
            }
            DecodeState::ExpectGob { slice } => {
                self.reader.align();
                let code = self.reader.read(SYNC_BITS);

                if code == PICTURE_END_CODE {
                    DecodeState::Done
                } else if code & 0x20 == 0 || code & !0x3F != 0 {
                    return Err(VideoError::InvalidGobCode { slice, code });
                } else {
                    self.gob_quant = self.reader.read(5) as u8;
                    DecodeState::ExpectMacroblock { slice, index: 0 }
                }
            }
            DecodeState::ExpectMacroblock { slice, index } => {
                let header = self.current_header()?;
                let mb = read_macroblock(&mut self.reader)?;
                write_rgb(&mb, rgb, header.width as usize, index, slice);

                if index + 1 < header.macroblocks_per_slice() {
                    DecodeState::ExpectMacroblock {
                        slice,
                        index: index + 1,
                    }
                } else if slice + 1 < header.slices() {
                    DecodeState::ExpectGob { slice: slice + 1 }
                } else {
                    DecodeState::ExpectEnd
                }
            }
            DecodeState::ExpectEnd => {
                self.reader.align();
                let code = self.reader.read(SYNC_BITS);

                if code != PICTURE_END_CODE {
                    return Err(VideoError::InvalidEndCode(code));
                }

                DecodeState::Done
            }
            DecodeState::Done | DecodeState::Aborted => self.state,
        };

        self.state = next;

        Ok(next)
    }

    fn current_header(&self) -> VideoResult<PictureHeader> {
        // заголовок всегда прочитан до первого макроблока
        self.header.ok_or(VideoError::InvalidStartCode(0))
    }
}

/// Параметры декодера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub word_order: WordOrder,
    /// Пропущенные макроблоки сохраняют пиксели предыдущего кадра;
    /// иначе — чёрные
    pub retain_skipped: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            word_order: WordOrder::BigEndian,
            retain_skipped: true,
        }
    }
}

/// Счётчики [`VideoDecoder`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames_ok: u64,
    pub frames_corrupt: u64,
    pub last_decode_time: Duration,
}

/// Декодер видеопотока с постоянным буфером кадра.
#[derive(Debug, Default)]
pub struct VideoDecoder {
    config: DecoderConfig,
    frame: Option<Picture>,
    stats: DecodeStats,
}

impl VideoDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            frame: None,
            stats: DecodeStats::default(),
        }
    }

    /// Декодирует датаграмму. При ошибке сохранённый кадр не меняется.
    pub fn decode(
        &mut self,
        data: &[u8],
    ) -> VideoResult<Picture> {
        let started = Instant::now();

        match self.decode_inner(data) {
            Ok(mut picture) => {
                picture.decode_time = started.elapsed();
                self.stats.frames_ok += 1;
                self.stats.last_decode_time = picture.decode_time;
                self.frame = Some(picture.clone());

                Ok(picture)
            }
            Err(e) => {
                self.stats.frames_corrupt += 1;
                Err(e)
            }
        }
    }

    fn decode_inner(
        &self,
        data: &[u8],
    ) -> VideoResult<Picture> {
        let mut parser = PictureParser::new(data, self.config.word_order);
        let header = parser.read_header()?;

        // рабочая копия: ошибка на середине кадра не портит сохранённый
        let mut scratch = match &self.frame {
            Some(prev)
                if self.config.retain_skipped
                    && prev.width == header.width
                    && prev.height == header.height =>
            {
                prev.rgb.clone()
            }
            _ => vec![0u8; frame_len(&header)],
        };

        parser.decode_into(&mut scratch)?;

        Ok(Picture {
            width: header.width,
            height: header.height,
            rgb: scratch,
            decode_time: Duration::ZERO,
        })
    }

    /// Последний успешно декодированный кадр.
    pub fn frame(&self) -> Option<&Picture> {
        self.frame.as_ref()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

/// Декодирует одну датаграмму в новый кадр с чёрного фона.
pub fn decode_picture(
    data: &[u8],
    order: WordOrder,
) -> VideoResult<Picture> {
    let started = Instant::now();
    let mut parser = PictureParser::new(data, order);

    let header = parser.read_header()?;
    let mut rgb = vec![0u8; frame_len(&header)];
    parser.decode_into(&mut rgb)?;

    Ok(Picture {
        width: header.width,
        height: header.height,
        rgb,
        decode_time: started.elapsed(),
    })
}

fn frame_len(header: &PictureHeader) -> usize {
    header.width as usize * header.height as usize * RGB_BYTES_PER_PIXEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::BitWriter,
        fixtures::{MacroblockSpec, PictureBuilder},
    };

    fn header_bytes(
        format: u32,
        resolution: u32,
    ) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write(PICTURE_START_CODE, 22);
        w.write(format, 2);
        w.write(resolution, 3);
        w.write(0, 3);
        w.write(0, 5);
        w.write(0, 32);
        w.into_bytes()
    }

    #[test]
    fn test_header_cif() {
        let bytes = header_bytes(1, 1);
        let header = read_picture_header(&mut BitReader::new(&bytes)).unwrap();

        assert_eq!((header.width, header.height), (88, 72));
        assert_eq!(header.format, PictureFormat::Cif);
        assert_eq!(header.slices(), 4);
        assert_eq!(header.macroblocks_per_slice(), 5);
    }

    #[test]
    fn test_header_qvga_doubled() {
        let bytes = header_bytes(2, 2);
        let header = read_picture_header(&mut BitReader::new(&bytes)).unwrap();

        assert_eq!((header.width, header.height), (320, 240));
    }

    #[test]
    fn test_header_rejects_zero_codes() {
        let bytes = header_bytes(0, 1);
        assert_eq!(
            read_picture_header(&mut BitReader::new(&bytes)),
            Err(VideoError::InvalidFormat(0))
        );

        let bytes = header_bytes(1, 0);
        assert_eq!(
            read_picture_header(&mut BitReader::new(&bytes)),
            Err(VideoError::InvalidResolution(0))
        );
    }

    #[test]
    fn test_header_rejects_bad_start_code() {
        let bytes = [0xFFu8; 16];
        let err = read_picture_header(&mut BitReader::new(&bytes)).unwrap_err();

        assert_eq!(err, VideoError::InvalidStartCode(0x3F_FFFF));
    }

    #[test]
    fn test_minimal_not_coded_picture() {
        // заголовок CIF, один GOB из пропущенных макроблоков, конец кадра
        let mut w = BitWriter::new();
        w.write(PICTURE_START_CODE, 22);
        w.write(1, 2);
        w.write(1, 3);
        w.write(0, 3);
        w.write(6, 5);
        w.write(1, 32);
        for _ in 0..5 {
            w.write(1, 1);
        }
        w.align();
        w.write(PICTURE_END_CODE, 22);
        let bytes = w.into_bytes();

        let picture = decode_picture(&bytes, WordOrder::BigEndian).unwrap();

        assert_eq!(picture.width, 88);
        assert_eq!(picture.height, 72);
        assert_eq!(picture.rgb.len(), 88 * 72 * 3);
        assert!(picture.rgb.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_state_machine_walk() {
        let bytes = PictureBuilder::new(PictureFormat::Cif, 1).build();
        let mut parser = PictureParser::new(&bytes, WordOrder::BigEndian);
        let mut rgb = vec![0u8; 88 * 72 * 3];

        assert_eq!(parser.state(), DecodeState::ExpectHeader);
        parser.read_header().unwrap();
        assert_eq!(
            parser.state(),
            DecodeState::ExpectMacroblock { slice: 0, index: 0 }
        );

        for _ in 0..5 {
            parser.step(&mut rgb).unwrap();
        }
        assert_eq!(parser.state(), DecodeState::ExpectGob { slice: 1 });

        let mut steps = 0;
        while parser.state() != DecodeState::Done {
            parser.step(&mut rgb).unwrap();
            steps += 1;
        }
        // 3 GOB + 15 макроблоков + конец
        assert_eq!(steps, 19);
    }

    #[test]
    fn test_gob_quant_follows_each_slice() {
        let mut w = BitWriter::new();
        w.write(PICTURE_START_CODE, 22);
        w.write(1, 2);
        w.write(1, 3);
        w.write(0, 3);
        w.write(3, 5);
        w.write(0, 32);
        for _ in 0..5 {
            w.write(1, 1);
        }
        for slice in 1..4u32 {
            w.align();
            w.write(0x20 | slice, 22);
            w.write(slice + 7, 5);
            for _ in 0..5 {
                w.write(1, 1);
            }
        }
        w.align();
        w.write(PICTURE_END_CODE, 22);
        let bytes = w.into_bytes();

        let mut parser = PictureParser::new(&bytes, WordOrder::BigEndian);
        let mut rgb = vec![0u8; 88 * 72 * 3];

        parser.read_header().unwrap();
        assert_eq!(parser.gob_quant(), 3);

        for _ in 0..5 {
            parser.step(&mut rgb).unwrap();
        }
        parser.step(&mut rgb).unwrap();
        assert_eq!(parser.gob_quant(), 8);

        while parser.state() != DecodeState::Done {
            parser.step(&mut rgb).unwrap();
        }
        assert_eq!(parser.gob_quant(), 10);
    }

    #[test]
    fn test_bad_gob_code_aborts() {
        let mut w = BitWriter::new();
        w.write(PICTURE_START_CODE, 22);
        w.write(1, 2);
        w.write(1, 3);
        w.write(0, 3);
        w.write(0, 5);
        w.write(0, 32);
        for _ in 0..5 {
            w.write(1, 1);
        }
        w.align();
        w.write(0x1F, 22);
        let bytes = w.into_bytes();

        let mut parser = PictureParser::new(&bytes, WordOrder::BigEndian);
        let mut rgb = vec![0u8; 88 * 72 * 3];

        let err = parser.decode_into(&mut rgb).unwrap_err();
        assert_eq!(err, VideoError::InvalidGobCode { slice: 1, code: 0x1F });
        assert_eq!(parser.state(), DecodeState::Aborted);
    }

    #[test]
    fn test_missing_end_code() {
        let mut bytes = PictureBuilder::new(PictureFormat::Cif, 1).build();
        let len = bytes.len();
        bytes.truncate(len - 3);

        let err = decode_picture(&bytes, WordOrder::BigEndian).unwrap_err();
        assert_eq!(err, VideoError::InvalidEndCode(0));
    }

    #[test]
    fn test_coded_picture_colors() {
        let bytes = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build();

        let picture = decode_picture(&bytes, WordOrder::BigEndian).unwrap();

        assert_eq!(picture.pixel(0, 0), Some([156, 156, 156]));
        assert_eq!(picture.pixel(79, 63), Some([156, 156, 156]));
        // правый и нижний край вне сетки макроблоков
        assert_eq!(picture.pixel(80, 0), Some([0, 0, 0]));
        assert_eq!(picture.pixel(0, 64), Some([0, 0, 0]));
    }

    #[test]
    fn test_decoder_retains_skipped_macroblocks() {
        let full = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build();
        let empty = PictureBuilder::new(PictureFormat::Cif, 1).build();

        let mut decoder = VideoDecoder::new(DecoderConfig::default());
        decoder.decode(&full).unwrap();
        let second = decoder.decode(&empty).unwrap();

        assert_eq!(second.pixel(10, 10), Some([156, 156, 156]));
        assert_eq!(decoder.stats().frames_ok, 2);
    }

    #[test]
    fn test_decoder_clears_skipped_when_configured() {
        let full = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build();
        let empty = PictureBuilder::new(PictureFormat::Cif, 1).build();

        let mut decoder = VideoDecoder::new(DecoderConfig {
            retain_skipped: false,
            ..DecoderConfig::default()
        });
        decoder.decode(&full).unwrap();
        let second = decoder.decode(&empty).unwrap();

        assert_eq!(second.pixel(10, 10), Some([0, 0, 0]));
    }

    #[test]
    fn test_corrupt_frame_keeps_previous() {
        let full = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build();
        let mut broken = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(100, 341, 341))
            .build();
        let len = broken.len();
        broken.truncate(len / 2);

        let mut decoder = VideoDecoder::new(DecoderConfig::default());
        decoder.decode(&full).unwrap();

        assert!(decoder.decode(&broken).is_err());
        assert_eq!(decoder.stats().frames_corrupt, 1);
        assert_eq!(
            decoder.frame().and_then(|f| f.pixel(0, 0)),
            Some([156, 156, 156])
        );
    }

    #[test]
    fn test_dimension_change_resets_buffer() {
        let cif = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build();
        let qvga = PictureBuilder::new(PictureFormat::Qvga, 1).build();

        let mut decoder = VideoDecoder::new(DecoderConfig::default());
        decoder.decode(&cif).unwrap();
        let pic = decoder.decode(&qvga).unwrap();

        assert_eq!((pic.width, pic.height), (160, 120));
        assert!(pic.rgb.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_little_endian_stream() {
        let bytes = PictureBuilder::new(PictureFormat::Cif, 1)
            .fill(MacroblockSpec::uniform(400, 341, 341))
            .build_with_order(WordOrder::LittleEndian);

        let picture = decode_picture(&bytes, WordOrder::LittleEndian).unwrap();
        assert_eq!(picture.pixel(5, 5), Some([156, 156, 156]));
    }
}

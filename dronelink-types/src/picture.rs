use std::time::Duration;

use crate::{VideoError, VideoResult};

/// Количество байт на пиксель в буфере RGB24.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Базовый формат кадра (2-битный код в заголовке).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PictureFormat {
    /// CIF: 88×72
    Cif = 1,
    /// QVGA: 160×120
    Qvga = 2,
}

/// Декодированный кадр.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// Ширина в пикселях
    pub width: u32,
    /// Высота в пикселях
    pub height: u32,
    /// Пиксели RGB24, построчно
    pub rgb: Vec<u8>,
    /// Время декодирования кадра
    pub decode_time: Duration,
}

impl PictureFormat {
    /// Код 0 зарезервирован. Код 3 трактуется как QVGA.
    pub fn from_code(code: u8) -> VideoResult<Self> {
        match code {
            1 => Ok(PictureFormat::Cif),
            2 | 3 => Ok(PictureFormat::Qvga),
            _ => Err(VideoError::InvalidFormat(code)),
        }
    }

    pub fn as_code(&self) -> u8 {
        *self as u8
    }

    /// Размеры до применения множителя разрешения.
    pub fn base_dimensions(&self) -> (u32, u32) {
        match self {
            PictureFormat::Cif => (88, 72),
            PictureFormat::Qvga => (160, 120),
        }
    }

    /// Размеры кадра: каждое измерение сдвигается на `multiplier - 1`.
    pub fn dimensions(
        &self,
        multiplier: u8,
    ) -> VideoResult<(u32, u32)> {
        if multiplier == 0 || multiplier > 7 {
            return Err(VideoError::InvalidResolution(multiplier));
        }

        let (w, h) = self.base_dimensions();
        let shift = u32::from(multiplier - 1);

        Ok((w << shift, h << shift))
    }
}

impl Picture {
    /// Чёрный кадр заданного размера.
    pub fn new(
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            width,
            height,
            rgb: vec![0; width as usize * height as usize * RGB_BYTES_PER_PIXEL],
            decode_time: Duration::ZERO,
        }
    }

    /// RGB пикселя `(x, y)` или `None` за пределами кадра.
    pub fn pixel(
        &self,
        x: u32,
        y: u32,
    ) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let off = (y as usize * self.width as usize + x as usize) * RGB_BYTES_PER_PIXEL;
        let px = self.rgb.get(off..off + RGB_BYTES_PER_PIXEL)?;

        Some([px[0], px[1], px[2]])
    }

    /// Разбирает кадр на `(width, height, rgb)`.
    pub fn into_parts(self) -> (u32, u32, Vec<u8>) {
        (self.width, self.height, self.rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_dimensions() {
        assert_eq!(PictureFormat::Cif.dimensions(1).unwrap(), (88, 72));
        assert_eq!(PictureFormat::Qvga.dimensions(2).unwrap(), (320, 240));
        assert_eq!(PictureFormat::Qvga.dimensions(3).unwrap(), (640, 480));
        assert!(PictureFormat::Cif.dimensions(0).is_err());
    }

    #[test]
    fn test_format_from_code() {
        assert_eq!(PictureFormat::from_code(1).unwrap(), PictureFormat::Cif);
        assert_eq!(PictureFormat::from_code(2).unwrap(), PictureFormat::Qvga);
        assert_eq!(PictureFormat::from_code(3).unwrap(), PictureFormat::Qvga);
        assert_eq!(
            PictureFormat::from_code(0),
            Err(VideoError::InvalidFormat(0))
        );
    }

    #[test]
    fn test_picture_pixel_access() {
        let mut pic = Picture::new(4, 2);
        assert_eq!(pic.rgb.len(), 4 * 2 * 3);

        // пиксель (3, 1) — последний в буфере
        let off = (4 + 3) * 3;
        pic.rgb[off..off + 3].copy_from_slice(&[1, 2, 3]);

        assert_eq!(pic.pixel(3, 1), Some([1, 2, 3]));
        assert_eq!(pic.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(pic.pixel(4, 0), None);
        assert_eq!(pic.pixel(0, 2), None);
    }
}

use thiserror::Error;

/// Результат для операций декодирования видео.
pub type VideoResult<T> = std::result::Result<T, VideoError>;

/// Результат для операций декодирования navdata.
pub type NavdataResult<T> = std::result::Result<T, NavdataError>;

/// Ошибки видеопотока. Любая из них означает повреждённый кадр:
/// кадр отбрасывается, ранее опубликованное изображение остаётся.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VideoError {
    /// Неверный 22-битный код начала кадра
    #[error("Invalid picture start code: {0:#08x}")]
    InvalidStartCode(u32),

    /// Нулевой код формата кадра
    #[error("Invalid picture format code: {0}")]
    InvalidFormat(u8),

    /// Нулевой множитель разрешения
    #[error("Invalid resolution multiplier: {0}")]
    InvalidResolution(u8),

    /// Неверный sync-код GOB
    #[error("Invalid GOB sync code {code:#08x} at slice {slice}")]
    InvalidGobCode { slice: usize, code: u32 },

    /// Неверный код конца кадра
    #[error("Invalid end-of-picture code: {0:#08x}")]
    InvalidEndCode(u32),

    /// Дескриптор макроблока без маркерного бита
    #[error("Invalid macroblock descriptor: {0:#04x}")]
    InvalidMacroblock(u8),

    /// Код длины серии нулей не помещается в окно
    #[error("Invalid zero-run code: {0:#05x}")]
    InvalidRunCode(u32),

    /// Код значения коэффициента не помещается в окно
    #[error("Invalid coefficient code: {0:#06x}")]
    InvalidLevelCode(u32),

    /// Индекс зигзага вышел за 64 коэффициента
    #[error("Coefficient overrun at zig-zag index {0}")]
    CoefficientOverrun(usize),
}

/// Ошибки navdata. Усечённые опции ошибкой не считаются.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavdataError {
    /// Датаграмма короче фиксированного заголовка
    #[error("Navdata datagram too short: {found} bytes, header needs {expected}")]
    TooShort { found: usize, expected: usize },

    /// Неверное магическое число
    #[error("Invalid navdata magic: {0:#010x}")]
    InvalidMagic(u32),
}

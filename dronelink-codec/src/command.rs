//! Кодировщик AT-команд: `AT*<NAME>=<seq>,<params>\r`.
//!
//! Вещественные параметры передаются как десятичное значение битового
//! образа IEEE-754, прочитанного как `i32`.

use std::fmt::Write as _;

/// Базовые биты команды REF (всегда установлены).
pub const REF_BASE: i32 = 0x1154_0000;

/// Бит взлёта в REF.
pub const REF_TAKEOFF: i32 = 1 << 9;

/// Бит аварийного режима в REF.
pub const REF_EMERGENCY: i32 = 1 << 8;

/// Параметр команды.
#[derive(Debug, Clone, PartialEq)]
pub enum AtParam {
    Int(i32),
    Float(f32),
    Str(String),
}

/// Все поддерживаемые команды.
#[derive(Debug, Clone, PartialEq)]
pub enum AtCommand {
    /// Режим полёта: взлёт/посадка и аварийный сброс
    Ref { takeoff: bool, emergency: bool },
    /// Движение; все значения в `[-1, 1]`
    Pcmd {
        progressive: bool,
        lr: f32,
        fb: f32,
        vv: f32,
        va: f32,
    },
    /// Калибровка горизонта (только на земле)
    Ftrim,
    Config { key: String, value: String },
    /// Сброс сторожевого таймера связи
    Comwdg,
    /// Выбор видеоканала
    Zap(i32),
    Aflight(bool),
    /// Прямое управление моторами
    Pwm([i32; 4]),
    Led { animation: i32, frequency: f32, duration: i32 },
    Anim { animation: i32, duration: i32 },
}

impl AtCommand {
    /// REF взлёта (`true`) или посадки.
    pub fn flight(takeoff: bool) -> Self {
        AtCommand::Ref {
            takeoff,
            emergency: false,
        }
    }

    /// PCMD со значениями, приведёнными к `[-1, 1]`.
    pub fn movement(
        progressive: bool,
        lr: f32,
        fb: f32,
        vv: f32,
        va: f32,
    ) -> Self {
        AtCommand::Pcmd {
            progressive,
            lr: clamp_unit(lr),
            fb: clamp_unit(fb),
            vv: clamp_unit(vv),
            va: clamp_unit(va),
        }
    }

    /// PCMD зависания: все значения нулевые.
    pub fn hover() -> Self {
        Self::movement(false, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn config(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        AtCommand::Config {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AtCommand::Ref { .. } => "REF",
            AtCommand::Pcmd { .. } => "PCMD",
            AtCommand::Ftrim => "FTRIM",
            AtCommand::Config { .. } => "CONFIG",
            AtCommand::Comwdg => "COMWDG",
            AtCommand::Zap(_) => "ZAP",
            AtCommand::Aflight(_) => "AFLIGHT",
            AtCommand::Pwm(_) => "PWM",
            AtCommand::Led { .. } => "LED",
            AtCommand::Anim { .. } => "ANIM",
        }
    }

    pub fn params(&self) -> Vec<AtParam> {
        match self {
            AtCommand::Ref { takeoff, emergency } => {
                vec![AtParam::Int(ref_flags(*takeoff, *emergency))]
            }
            AtCommand::Pcmd {
                progressive,
                lr,
                fb,
                vv,
                va,
            } => vec![
                AtParam::Int(i32::from(*progressive)),
                AtParam::Float(*lr),
                AtParam::Float(*fb),
                AtParam::Float(*vv),
                AtParam::Float(*va),
            ],
            AtCommand::Ftrim | AtCommand::Comwdg => Vec::new(),
            AtCommand::Config { key, value } => {
                vec![AtParam::Str(key.clone()), AtParam::Str(value.clone())]
            }
            AtCommand::Zap(stream) => vec![AtParam::Int(*stream)],
            AtCommand::Aflight(on) => vec![AtParam::Int(i32::from(*on))],
            AtCommand::Pwm(motors) => motors.iter().map(|m| AtParam::Int(*m)).collect(),
            AtCommand::Led {
                animation,
                frequency,
                duration,
            } => vec![
                AtParam::Int(*animation),
                AtParam::Float(*frequency),
                AtParam::Int(*duration),
            ],
            AtCommand::Anim {
                animation,
                duration,
            } => vec![AtParam::Int(*animation), AtParam::Int(*duration)],
        }
    }

    /// Строка команды с порядковым номером `seq`.
    pub fn encode(
        &self,
        seq: u32,
    ) -> String {
        let mut out = format!("AT*{}={}", self.name(), seq);

        for param in self.params() {
            // запись в String не завершается ошибкой
            let _ = match param {
                AtParam::Int(v) => write!(out, ",{v}"),
                AtParam::Float(v) => write!(out, ",{}", float_to_int(v)),
                AtParam::Str(v) => write!(out, ",\"{v}\""),
            };
        }

        out.push('\r');
        out
    }
}

/// Битовый образ `f32` как знаковое целое.
pub fn float_to_int(value: f32) -> i32 {
    value.to_bits() as i32
}

/// Параметр REF.
pub fn ref_flags(
    takeoff: bool,
    emergency: bool,
) -> i32 {
    let mut flags = REF_BASE;
    if takeoff {
        flags |= REF_TAKEOFF;
    }
    if emergency {
        flags |= REF_EMERGENCY;
    }
    flags
}

/// Приводит значение к `[-1, 1]`; NaN становится нулём.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

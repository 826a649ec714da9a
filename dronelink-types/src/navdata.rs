//! Телеметрия (navdata) в декодированном виде.
//!
//! Запись собирается заново из каждой датаграммы, предыдущая отбрасывается.

use std::collections::BTreeMap;

use serde::{ser::SerializeMap, Serialize, Serializer};

/// Магическое число заголовка navdata.
pub const NAVDATA_MAGIC: u32 = 0x5566_7788;

/// Именованные флаги 32-битного поля состояния аппарата.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFlag {
    /// (0) на земле, (1) в полёте
    Fly,
    Video,
    Vision,
    /// (0) управление углами Эйлера, (1) угловыми скоростями
    Control,
    Altitude,
    UserFeedbackStart,
    /// Получено подтверждение команды
    Command,
    FwFile,
    NavdataDemo,
    NavdataBootstrap,
    /// Проблема с моторами
    Motors,
    ComLost,
    VbatLow,
    /// Пользовательская аварийная посадка
    UserEmergencyLanding,
    TimerElapsed,
    AnglesOutOfRange,
    Ultrasound,
    Cutout,
    PicVersion,
    AtCodecThreadOn,
    NavdataThreadOn,
    VideoThreadOn,
    AcqThreadOn,
    CtrlWatchdog,
    AdcWatchdog,
    /// Связь по командному каналу потеряна
    ComWatchdog,
    Emergency,
}

/// Поле состояния аппарата из заголовка navdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DroneState(pub u32);

/// Основное состояние автомата управления (старшие 16 бит `ctrl_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlState {
    Default,
    Init,
    Landed,
    Flying,
    Hovering,
    Test,
    TakingOff,
    GotoFix,
    Landing,
    Looping,
    Unknown(u16),
}

/// Полезная нагрузка опции "demo" (id 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemoData {
    pub ctrl_state: u32,
    /// Заряд батареи, %
    pub battery: u32,
    /// Тангаж, градусы
    pub theta: i32,
    /// Крен, градусы
    pub phi: i32,
    /// Рыскание, градусы
    pub psi: i32,
    /// Высота, мм
    pub altitude: i32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub num_frames: u32,
}

/// Одна опция navdata по числовому id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NavdataOption {
    Demo(DemoData),
    /// Контрольная сумма (id 0xFFFF)
    Checksum(u32),
    /// Нераспознанный id — сырые байты
    Opaque(Vec<u8>),
}

/// Декодированная датаграмма navdata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavdataRecord {
    /// Магическое число заголовка
    pub header: u32,
    pub drone_state: DroneState,
    /// Порядковый номер датаграммы
    pub sequence: u32,
    pub vision_flag: u32,
    pub options: BTreeMap<u16, NavdataOption>,
    /// Хвостовая опция была усечена, запись неполная
    pub truncated: bool,
    /// Совпала ли контрольная сумма (None, если опции 0xFFFF нет)
    pub checksum_valid: Option<bool>,
}

impl StateFlag {
    /// Все 27 флагов в порядке возрастания бита.
    pub const ALL: [StateFlag; 27] = [
        StateFlag::Fly,
        StateFlag::Video,
        StateFlag::Vision,
        StateFlag::Control,
        StateFlag::Altitude,
        StateFlag::UserFeedbackStart,
        StateFlag::Command,
        StateFlag::FwFile,
        StateFlag::NavdataDemo,
        StateFlag::NavdataBootstrap,
        StateFlag::Motors,
        StateFlag::ComLost,
        StateFlag::VbatLow,
        StateFlag::UserEmergencyLanding,
        StateFlag::TimerElapsed,
        StateFlag::AnglesOutOfRange,
        StateFlag::Ultrasound,
        StateFlag::Cutout,
        StateFlag::PicVersion,
        StateFlag::AtCodecThreadOn,
        StateFlag::NavdataThreadOn,
        StateFlag::VideoThreadOn,
        StateFlag::AcqThreadOn,
        StateFlag::CtrlWatchdog,
        StateFlag::AdcWatchdog,
        StateFlag::ComWatchdog,
        StateFlag::Emergency,
    ];

    /// Номер бита в поле состояния.
    pub fn bit(&self) -> u32 {
        match self {
            StateFlag::Fly => 0,
            StateFlag::Video => 1,
            StateFlag::Vision => 2,
            StateFlag::Control => 3,
            StateFlag::Altitude => 4,
            StateFlag::UserFeedbackStart => 5,
            StateFlag::Command => 6,
            StateFlag::FwFile => 7,
            StateFlag::NavdataDemo => 10,
            StateFlag::NavdataBootstrap => 11,
            StateFlag::Motors => 12,
            StateFlag::ComLost => 13,
            StateFlag::VbatLow => 15,
            StateFlag::UserEmergencyLanding => 16,
            StateFlag::TimerElapsed => 17,
            StateFlag::AnglesOutOfRange => 19,
            StateFlag::Ultrasound => 21,
            StateFlag::Cutout => 22,
            StateFlag::PicVersion => 23,
            StateFlag::AtCodecThreadOn => 24,
            StateFlag::NavdataThreadOn => 25,
            StateFlag::VideoThreadOn => 26,
            StateFlag::AcqThreadOn => 27,
            StateFlag::CtrlWatchdog => 28,
            StateFlag::AdcWatchdog => 29,
            StateFlag::ComWatchdog => 30,
            StateFlag::Emergency => 31,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StateFlag::Fly => "fly_mask",
            StateFlag::Video => "video_mask",
            StateFlag::Vision => "vision_mask",
            StateFlag::Control => "control_mask",
            StateFlag::Altitude => "altitude_mask",
            StateFlag::UserFeedbackStart => "user_feedback_start",
            StateFlag::Command => "command_mask",
            StateFlag::FwFile => "fw_file_mask",
            StateFlag::NavdataDemo => "navdata_demo_mask",
            StateFlag::NavdataBootstrap => "navdata_bootstrap",
            StateFlag::Motors => "motors_mask",
            StateFlag::ComLost => "com_lost_mask",
            StateFlag::VbatLow => "vbat_low",
            StateFlag::UserEmergencyLanding => "user_el",
            StateFlag::TimerElapsed => "timer_elapsed",
            StateFlag::AnglesOutOfRange => "angles_out_of_range",
            StateFlag::Ultrasound => "ultrasound_mask",
            StateFlag::Cutout => "cutout_mask",
            StateFlag::PicVersion => "pic_version_mask",
            StateFlag::AtCodecThreadOn => "atcodec_thread_on",
            StateFlag::NavdataThreadOn => "navdata_thread_on",
            StateFlag::VideoThreadOn => "video_thread_on",
            StateFlag::AcqThreadOn => "acq_thread_on",
            StateFlag::CtrlWatchdog => "ctrl_watchdog_mask",
            StateFlag::AdcWatchdog => "adc_watchdog_mask",
            StateFlag::ComWatchdog => "com_watchdog_mask",
            StateFlag::Emergency => "emergency_mask",
        }
    }
}

impl DroneState {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn is_set(
        &self,
        flag: StateFlag,
    ) -> bool {
        self.0 >> flag.bit() & 1 == 1
    }

    /// Значение флага как 0/1.
    pub fn get(
        &self,
        flag: StateFlag,
    ) -> u8 {
        u8::from(self.is_set(flag))
    }

    /// Пары `(имя, 0/1)` для всех именованных флагов.
    pub fn flags(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        StateFlag::ALL.iter().map(move |f| (f.name(), self.get(*f)))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl ControlState {
    pub fn from_ctrl_state(ctrl_state: u32) -> Self {
        match (ctrl_state >> 16) as u16 {
            0 => ControlState::Default,
            1 => ControlState::Init,
            2 => ControlState::Landed,
            3 => ControlState::Flying,
            4 => ControlState::Hovering,
            5 => ControlState::Test,
            6 => ControlState::TakingOff,
            7 => ControlState::GotoFix,
            8 => ControlState::Landing,
            9 => ControlState::Looping,
            other => ControlState::Unknown(other),
        }
    }
}

impl DemoData {
    pub fn control_state(&self) -> ControlState {
        ControlState::from_ctrl_state(self.ctrl_state)
    }
}

impl NavdataRecord {
    /// Пустая запись с заданным заголовком.
    pub fn new(
        drone_state: DroneState,
        sequence: u32,
        vision_flag: u32,
    ) -> Self {
        Self {
            header: NAVDATA_MAGIC,
            drone_state,
            sequence,
            vision_flag,
            options: BTreeMap::new(),
            truncated: false,
            checksum_valid: None,
        }
    }

    /// Опция "demo", если она была в датаграмме.
    pub fn demo(&self) -> Option<&DemoData> {
        match self.options.get(&0) {
            Some(NavdataOption::Demo(d)) => Some(d),
            _ => None,
        }
    }

    pub fn option(
        &self,
        id: u16,
    ) -> Option<&NavdataOption> {
        self.options.get(&id)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Сериализация
////////////////////////////////////////////////////////////////////////////////

impl Serialize for DroneState {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(StateFlag::ALL.len()))?;

        for (name, value) in self.flags() {
            map.serialize_entry(name, &value)?;
        }

        map.end()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

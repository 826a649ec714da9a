use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use dronelink_codec::{DecoderConfig, WordOrder};

use crate::{ClientError, ClientResult};

/// Направление поступательного движения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    Forward,
    Backward,
}

/// Направление поворота вокруг вертикальной оси.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Left,
    Right,
}

/// Адреса, периоды и политика декодирования канала связи.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Адрес аппарата
    pub drone_ip: IpAddr,
    pub navdata_port: u16,
    pub video_port: u16,
    pub command_port: u16,
    /// Локальный адрес привязки сокетов
    pub local_ip: IpAddr,
    pub local_navdata_port: u16,
    pub local_video_port: u16,
    /// 0 — эфемерный порт
    pub local_command_port: u16,
    /// Период keep-alive сторожевого таймера
    pub watchdog_period: Duration,
    /// Ограниченное ожидание потока публикации
    pub dispatch_poll: Duration,
    /// Скорость для вызовов движения без явного значения
    pub default_speed: f32,
    /// Потолок высоты, мм (отправляется при взлёте)
    pub max_altitude_mm: u32,
    /// Включить режим navdata demo при подключении
    pub navdata_demo: bool,
    pub video_word_order: WordOrder,
    /// Пропущенные макроблоки сохраняют пиксели предыдущего кадра
    pub retain_skipped_macroblocks: bool,
    /// Размер приёмного буфера, байт
    pub max_datagram: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LinkConfig {
    pub fn navdata_addr(&self) -> SocketAddr {
        SocketAddr::new(self.drone_ip, self.navdata_port)
    }

    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.drone_ip, self.video_port)
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.drone_ip, self.command_port)
    }

    pub fn local_navdata_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.local_navdata_port)
    }

    pub fn local_video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.local_video_port)
    }

    pub fn local_command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.local_command_port)
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            word_order: self.video_word_order,
            retain_skipped: self.retain_skipped_macroblocks,
        }
    }

    /// Проверяет значения, которые нельзя выразить типами.
    pub fn validate(&self) -> ClientResult<()> {
        if self.watchdog_period.is_zero() {
            return Err(ClientError::Config("watchdog_period must be > 0".into()));
        }

        if self.dispatch_poll.is_zero() {
            return Err(ClientError::Config("dispatch_poll must be > 0".into()));
        }

        if !(0.0..=1.0).contains(&self.default_speed) {
            return Err(ClientError::Config(format!(
                "default_speed must be in [0, 1], got {}",
                self.default_speed
            )));
        }

        if self.max_datagram == 0 {
            return Err(ClientError::Config("max_datagram must be > 0".into()));
        }

        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для Direction, Rotation, LinkConfig
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for Direction {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" | "l" => Ok(Direction::Left),
            "right" | "r" => Ok(Direction::Right),
            "up" | "u" => Ok(Direction::Up),
            "down" | "d" => Ok(Direction::Down),
            "forward" | "fwd" | "f" => Ok(Direction::Forward),
            "backward" | "back" | "b" => Ok(Direction::Backward),
            _ => Err(format!(
                "Unknown direction: '{s}'. Use: left, right, up, down, forward, backward"
            )),
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Rotation::Left => write!(f, "left"),
            Rotation::Right => write!(f, "right"),
        }
    }
}

impl std::str::FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" | "ccw" => Ok(Rotation::Left),
            "right" | "cw" => Ok(Rotation::Right),
            _ => Err(format!("Unknown rotation: '{s}'. Use: left, right")),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            drone_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            navdata_port: 5554,
            video_port: 5555,
            command_port: 5556,
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_navdata_port: 5554,
            local_video_port: 5555,
            local_command_port: 0,
            watchdog_period: Duration::from_millis(200),
            dispatch_poll: Duration::from_millis(100),
            default_speed: 0.2,
            max_altitude_mm: 20_000,
            navdata_demo: true,
            video_word_order: WordOrder::BigEndian,
            retain_skipped_macroblocks: true,
            max_datagram: 65_535,
        }
    }
}

/// Парсит длительность.
///
/// Поддерживает суффиксы `ms` и `s`; число без суффикса — миллисекунды.
///
/// # Примеры
/// ```
/// use std::time::Duration;
/// use dronelink_client::config::parse_duration;
/// assert_eq!(parse_duration("200ms").unwrap(), Duration::from_millis(200));
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let lower = s.to_lowercase();

    let (num_str, scale) = if let Some(v) = lower.strip_suffix("ms") {
        (v.trim(), 1e-3)
    } else if let Some(v) = lower.strip_suffix('s') {
        (v.trim(), 1.0)
    } else {
        return s
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| format!("Invalid duration '{s}': {e}"));
    };

    let n: f64 = num_str
        .parse()
        .map_err(|e| format!("Invalid duration value '{num_str}': {e}"))?;

    if !n.is_finite() || n < 0.0 {
        return Err(format!("Invalid duration '{s}': must be a non-negative number"));
    }

    Ok(Duration::from_secs_f64(n * scale))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("200ms").unwrap(), Duration::from_millis(200));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2S").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_direction_fromstr() {
        assert_eq!("left".parse::<Direction>().unwrap(), Direction::Left);
        assert_eq!("FWD".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!("back".parse::<Direction>().unwrap(), Direction::Backward);
        assert!("sideways".parse::<Direction>().is_err());

        assert_eq!(Direction::Up.to_string(), "up");
    }

    #[test]
    fn test_rotation_fromstr() {
        assert_eq!("cw".parse::<Rotation>().unwrap(), Rotation::Right);
        assert_eq!("left".parse::<Rotation>().unwrap(), Rotation::Left);
        assert!("up".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_default_addresses() {
        let cfg = LinkConfig::default();

        assert_eq!(cfg.command_addr().to_string(), "192.168.1.1:5556");
        assert_eq!(cfg.video_addr().port(), 5555);
        assert_eq!(cfg.navdata_addr().port(), 5554);
        assert_eq!(cfg.local_command_addr().port(), 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = LinkConfig {
            watchdog_period: Duration::ZERO,
            ..LinkConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ClientError::Config(_))));

        let cfg = LinkConfig {
            default_speed: 1.5,
            ..LinkConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = LinkConfig {
            default_speed: f32::NAN,
            ..LinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// UDP-канал, к которому относится ошибка сокета.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Video,
    Navdata,
    Command,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Ошибка ввода-вывода вне конкретного канала
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Отказ сокета (не would-block): фатален для владеющего потока
    #[error("{channel} socket error: {source}")]
    Socket {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    /// Некорректная конфигурация
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Не удалось построить асинхронный runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Рабочий поток завершился паникой
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(&'static str),

    /// Канал управления уже закрыт
    #[error("Control link is closed")]
    LinkClosed,

    /// Ошибка сохранения снимка кадра
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl ClientError {
    pub fn socket(
        channel: Channel,
        source: std::io::Error,
    ) -> Self {
        ClientError::Socket { channel, source }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Channel::Video => write!(f, "video"),
            Channel::Navdata => write!(f, "navdata"),
            Channel::Command => write!(f, "command"),
        }
    }
}

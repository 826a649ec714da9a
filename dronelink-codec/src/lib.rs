//! Кодек канала управления квадрокоптером.
//!
//! Чистые функции без блокировок: побитовое чтение видеопотока,
//! энтропийное декодирование, обратное ДКП, сборка макроблоков и кадров,
//! разбор navdata и формирование AT-команд.
//!
//! # Быстрый старт
//!
//! ```no_run
//! use dronelink_codec::{decode_navdata, AtCommand, DecoderConfig, VideoDecoder};
//!
//! # let datagram: Vec<u8> = Vec::new();
//! let mut decoder = VideoDecoder::new(DecoderConfig::default());
//! if let Ok(picture) = decoder.decode(&datagram) {
//!     println!("{}x{}", picture.width, picture.height);
//! }
//!
//! let record = decode_navdata(&datagram)?;
//! println!("battery: {:?}", record.demo().map(|d| d.battery));
//!
//! let line = AtCommand::flight(true).encode(1);
//! assert_eq!(line, "AT*REF=1,290718208\r");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binary;
pub mod command;
pub mod fixtures;
pub mod navdata;
pub mod video;

pub use binary::*;
pub use command::*;
pub use navdata::*;
pub use video::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

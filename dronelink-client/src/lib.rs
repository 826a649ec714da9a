//! Клиент аппарата: канал управления с keep-alive, приём видео и
//! телеметрии, публикация последних значений и фасад [`Drone`].

pub mod config;
pub mod control;
pub mod dispatch;
pub mod drone;
pub mod error;
pub mod metrics;
pub mod network;
pub mod snapshot;

pub use config::*;
pub use control::*;
pub use dispatch::*;
pub use drone::*;
pub use error::*;
pub use metrics::*;
pub use network::*;
pub use snapshot::*;

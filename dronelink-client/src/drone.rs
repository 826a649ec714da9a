//! Фасад аппарата: собирает канал управления, сетевой поток и поток
//! публикации в один объект с методами полёта.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use dronelink_types::{NavdataRecord, Picture};
use log::{info, warn};

use crate::{
    ClientError, ClientResult, ControlLink, Direction, DispatchThread, LatestState, LinkConfig,
    LinkMetrics, NetworkProcess, Rotation,
};

/// Подключённый аппарат.
///
/// Все методы принимают `&self`, поэтому фасад можно разделять между
/// потоками через `Arc`.
pub struct Drone {
    config: LinkConfig,
    metrics: Arc<LinkMetrics>,
    state: Arc<LatestState>,
    control: Arc<ControlLink>,
    network: Mutex<Option<NetworkProcess>>,
    dispatch: Mutex<Option<DispatchThread>>,
    local_video: SocketAddr,
    local_navdata: SocketAddr,
    /// Биты f32 скорости по умолчанию
    speed: AtomicU32,
    halted: AtomicBool,
}

impl Drone {
    /// Открывает все три канала и запускает рабочие потоки.
    pub fn connect(config: LinkConfig) -> ClientResult<Self> {
        config.validate()?;

        let metrics = LinkMetrics::new();
        let state = LatestState::new();

        let control = Arc::new(ControlLink::open(&config, metrics.clone(), state.clone())?);

        // отказ любого потока сразу глушит keep-alive
        let link = Arc::downgrade(&control);
        state.set_fault_hook(Box::new(move |fault| {
            warn!("Closing control link after fault: {fault}");
            if let Some(control) = link.upgrade() {
                control.close();
            }
        }));

        let (network, channels) = NetworkProcess::spawn(&config, metrics.clone())?;
        let local_video = network.local_video_addr();
        let local_navdata = network.local_navdata_addr();

        let dispatch =
            DispatchThread::spawn(channels, state.clone(), metrics.clone(), config.dispatch_poll)?;

        if config.navdata_demo {
            control.set_config("general:navdata_demo", "TRUE")?;
        }

        info!("Connected to {}", config.drone_ip);

        Ok(Self {
            speed: AtomicU32::new(config.default_speed.to_bits()),
            config,
            metrics,
            state,
            control,
            network: Mutex::new(Some(network)),
            dispatch: Mutex::new(Some(dispatch)),
            local_video,
            local_navdata,
            halted: AtomicBool::new(false),
        })
    }

    ////////////////////////////////////////////////////////////////////////////
    // Полёт
    ////////////////////////////////////////////////////////////////////////////

    /// Калибровка горизонта, потолок высоты, затем взлёт.
    pub fn takeoff(&self) -> ClientResult<()> {
        self.ensure_healthy()?;

        self.control.flat_trim()?;
        self.control.set_config(
            "control:altitude_max",
            &self.config.max_altitude_mm.to_string(),
        )?;
        self.control.set_flight_mode(true, false)?;

        info!("Takeoff requested");
        Ok(())
    }

    pub fn land(&self) -> ClientResult<()> {
        self.ensure_healthy()?;
        self.control.set_flight_mode(false, false)?;

        info!("Landing requested");
        Ok(())
    }

    /// Зависание: нулевые скорости без прогрессивного режима.
    pub fn hover(&self) -> ClientResult<()> {
        self.ensure_healthy()?;
        self.control.set_movement(false, 0.0, 0.0, 0.0, 0.0)?;
        Ok(())
    }

    /// Поступательное движение; `None` берёт текущую скорость.
    pub fn move_in(
        &self,
        direction: Direction,
        speed: Option<f32>,
    ) -> ClientResult<()> {
        let s = speed.unwrap_or_else(|| self.speed());

        let (lr, fb, vv) = match direction {
            Direction::Left => (-s, 0.0, 0.0),
            Direction::Right => (s, 0.0, 0.0),
            Direction::Forward => (0.0, -s, 0.0),
            Direction::Backward => (0.0, s, 0.0),
            Direction::Up => (0.0, 0.0, s),
            Direction::Down => (0.0, 0.0, -s),
        };

        self.move_raw(lr, fb, vv, 0.0)
    }

    /// Поворот вокруг вертикальной оси.
    pub fn turn(
        &self,
        rotation: Rotation,
        speed: Option<f32>,
    ) -> ClientResult<()> {
        let s = speed.unwrap_or_else(|| self.speed());

        let va = match rotation {
            Rotation::Left => -s,
            Rotation::Right => s,
        };

        self.move_raw(0.0, 0.0, 0.0, va)
    }

    /// Произвольная комбинация осей в прогрессивном режиме.
    pub fn move_raw(
        &self,
        lr: f32,
        fb: f32,
        vv: f32,
        va: f32,
    ) -> ClientResult<()> {
        self.ensure_healthy()?;
        self.control.set_movement(true, lr, fb, vv, va)?;
        Ok(())
    }

    /// Сброс аварийного состояния: REF с флагом, затем обычный REF.
    pub fn reset(&self) -> ClientResult<()> {
        self.ensure_healthy()?;

        self.control.set_flight_mode(false, true)?;
        self.control.set_flight_mode(false, false)?;

        warn!("Emergency reset sent");
        Ok(())
    }

    pub fn trim(&self) -> ClientResult<()> {
        self.ensure_healthy()?;
        self.control.flat_trim()?;
        Ok(())
    }

    /// Скорость по умолчанию для `move_in`/`turn`, в `[0, 1]`.
    pub fn set_speed(
        &self,
        speed: f32,
    ) -> ClientResult<()> {
        if !(0.0..=1.0).contains(&speed) {
            return Err(ClientError::Config(format!(
                "speed must be in [0, 1], got {speed}"
            )));
        }

        self.speed.store(speed.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Телеметрия
    ////////////////////////////////////////////////////////////////////////////

    /// Последний кадр как `(width, height, rgb)`.
    pub fn latest_image(&self) -> Option<(u32, u32, Vec<u8>)> {
        self.state.image().map(|p| {
            Arc::try_unwrap(p)
                .map(Picture::into_parts)
                .unwrap_or_else(|p| (p.width, p.height, p.rgb.clone()))
        })
    }

    /// Последний кадр без копирования пикселей.
    pub fn latest_picture(&self) -> Option<Arc<Picture>> {
        self.state.image()
    }

    pub fn latest_navdata(&self) -> Option<Arc<NavdataRecord>> {
        self.state.navdata()
    }

    /// Фатальная ошибка рабочего потока, если она была.
    pub fn fault(&self) -> Option<Arc<ClientError>> {
        self.state.fault()
    }

    pub fn metrics(&self) -> Arc<LinkMetrics> {
        self.metrics.clone()
    }

    pub fn control(&self) -> &ControlLink {
        &self.control
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn local_video_addr(&self) -> SocketAddr {
        self.local_video
    }

    pub fn local_navdata_addr(&self) -> SocketAddr {
        self.local_navdata
    }

    pub fn local_command_addr(&self) -> SocketAddr {
        self.control.local_addr()
    }

    /// Канал остановлен вызовом `halt` или закрыт после отказа.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed) || self.control.is_closed()
    }

    ////////////////////////////////////////////////////////////////////////////
    // Остановка
    ////////////////////////////////////////////////////////////////////////////

    /// Останавливает сторожевой таймер, сетевой поток и поток публикации.
    ///
    /// Повторный вызов ничего не делает. Возвращается первая ошибка,
    /// но остановка всех частей выполняется в любом случае.
    pub fn halt(&self) -> ClientResult<()> {
        if self.halted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let control = self.control.shutdown();

        let network = self
            .network
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map_or(Ok(()), |mut n| n.shutdown());

        let dispatch = self
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map_or(Ok(()), |mut d| d.shutdown());

        info!("Link halted");

        control.and(network).and(dispatch)
    }

    /// Отказ рабочего потока закрывает канал целиком.
    fn ensure_healthy(&self) -> ClientResult<()> {
        if self.halted.load(Ordering::Relaxed) {
            return Err(ClientError::LinkClosed);
        }

        if let Some(fault) = self.state.fault() {
            warn!("Halting after link fault: {fault}");
            self.halt()?;
            return Err(ClientError::LinkClosed);
        }

        Ok(())
    }
}

impl Drop for Drone {
    fn drop(&mut self) {
        if let Err(e) = self.halt() {
            warn!("Halt on drop: {e}");
        }
    }
}

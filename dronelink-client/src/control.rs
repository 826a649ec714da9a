//! Командный канал: порядковые номера, отправка AT-команд и сторожевой
//! таймер keep-alive.
//!
//! Одна критическая секция охватывает «номер, отрисовка, отправка,
//! перевзвод таймера», поэтому команды пользователя и keep-alive
//! сторожевого потока никогда не получают один номер и не
//! перемежаются на проводе.
//!
//! Отказ сокета (кроме прерывания и would-block) фатален: канал
//! закрывается, сторожевой поток останавливается, ошибка попадает в
//! [`LatestState`].

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{atomic::Ordering, Arc, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, RecvTimeoutError, Receiver, Sender};
use dronelink_codec::AtCommand;
use log::{debug, error, info, trace, warn};

use crate::{Channel, ClientError, ClientResult, LatestState, LinkConfig, LinkMetrics};

/// Первый порядковый номер после открытия канала.
pub const FIRST_SEQUENCE: u32 = 1;

enum WatchdogSignal {
    Rearm,
    Stop,
}

/// Состояние под замком.
struct LinkSection {
    socket: UdpSocket,
    target: SocketAddr,
    /// Номер следующей команды
    seq: u32,
    last_send: Instant,
    closed: bool,
}

/// Канал управления с keep-alive.
pub struct ControlLink {
    section: Arc<Mutex<LinkSection>>,
    metrics: Arc<LinkMetrics>,
    faults: Arc<LatestState>,
    period: Duration,
    local_addr: SocketAddr,
    watchdog_tx: Sender<WatchdogSignal>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl ControlLink {
    /// Открывает сокет на `local_command_addr` и запускает сторожевой поток.
    ///
    /// Фатальные ошибки отправки записываются в `faults`.
    pub fn open(
        config: &LinkConfig,
        metrics: Arc<LinkMetrics>,
        faults: Arc<LatestState>,
    ) -> ClientResult<Self> {
        let socket = UdpSocket::bind(config.local_command_addr())
            .map_err(|e| ClientError::socket(Channel::Command, e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| ClientError::socket(Channel::Command, e))?;

        let section = Arc::new(Mutex::new(LinkSection {
            socket,
            target: config.command_addr(),
            seq: FIRST_SEQUENCE,
            last_send: Instant::now(),
            closed: false,
        }));

        let period = config.watchdog_period;
        let (watchdog_tx, watchdog_rx) = unbounded();

        let section_wd = section.clone();
        let metrics_wd = metrics.clone();
        let faults_wd = faults.clone();
        let handle = std::thread::Builder::new()
            .name("dronelink-watchdog".into())
            .spawn(move || {
                watchdog_loop(watchdog_rx, section_wd, faults_wd, metrics_wd, period)
            })?;

        info!(
            "Control link {} -> {}, keep-alive every {:?}",
            local_addr,
            config.command_addr(),
            period
        );

        Ok(Self {
            section,
            metrics,
            faults,
            period,
            local_addr,
            watchdog_tx,
            watchdog: Mutex::new(Some(handle)),
        })
    }

    /// Отправляет команду; возвращает присвоенный ей номер.
    pub fn send(
        &self,
        command: &AtCommand,
    ) -> ClientResult<u32> {
        let sent = {
            let mut section = self.lock()?;
            let sent = transmit(&mut section, command, &self.metrics);

            if sent.is_ok() {
                self.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                // перевзвод под замком секции
                let _ = self.watchdog_tx.send(WatchdogSignal::Rearm);
            }

            sent
        };

        sent.map_err(|e| self.fail(e))
    }

    /// REF: взлёт/посадка и аварийный флаг.
    pub fn set_flight_mode(
        &self,
        takeoff: bool,
        emergency: bool,
    ) -> ClientResult<u32> {
        self.send(&AtCommand::Ref { takeoff, emergency })
    }

    /// PCMD; значения приводятся к `[-1, 1]`.
    pub fn set_movement(
        &self,
        progressive: bool,
        lr: f32,
        fb: f32,
        vv: f32,
        va: f32,
    ) -> ClientResult<u32> {
        self.send(&AtCommand::movement(progressive, lr, fb, vv, va))
    }

    pub fn flat_trim(&self) -> ClientResult<u32> {
        self.send(&AtCommand::Ftrim)
    }

    pub fn set_config(
        &self,
        key: &str,
        value: &str,
    ) -> ClientResult<u32> {
        self.send(&AtCommand::config(key, value))
    }

    pub fn send_keepalive(&self) -> ClientResult<u32> {
        self.send(&AtCommand::Comwdg)
    }

    /// Номер, который получит следующая команда.
    pub fn next_sequence(&self) -> ClientResult<u32> {
        Ok(self.lock()?.seq)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn watchdog_period(&self) -> Duration {
        self.period
    }

    pub fn is_closed(&self) -> bool {
        self.section.lock().map(|s| s.closed).unwrap_or(true)
    }

    /// Закрывает канал и велит сторожевому потоку завершиться, не дожидаясь его.
    ///
    /// Можно вызывать из любого потока, в том числе из обработчика отказа.
    pub fn close(&self) {
        mark_closed(&self.section);
        let _ = self.watchdog_tx.send(WatchdogSignal::Stop);
    }

    /// Останавливает сторожевой поток, затем закрывает канал.
    pub fn shutdown(&self) -> ClientResult<()> {
        let handle = self
            .watchdog
            .lock()
            .map_err(|_| ClientError::WorkerPanicked("watchdog"))?
            .take();

        if let Some(handle) = handle {
            let _ = self.watchdog_tx.send(WatchdogSignal::Stop);
            handle
                .join()
                .map_err(|_| ClientError::WorkerPanicked("watchdog"))?;
            debug!("Watchdog stopped");
        }

        mark_closed(&self.section);

        Ok(())
    }

    fn lock(&self) -> ClientResult<MutexGuard<'_, LinkSection>> {
        let section = self.section.lock().map_err(|_| ClientError::LinkClosed)?;

        if section.closed {
            return Err(ClientError::LinkClosed);
        }

        Ok(section)
    }

    /// Ошибка отправки для вызывающего; фатальная дополнительно закрывает канал.
    fn fail(
        &self,
        e: io::Error,
    ) -> ClientError {
        if is_transient(&e) {
            return ClientError::socket(Channel::Command, e);
        }

        let reported = ClientError::socket(
            Channel::Command,
            io::Error::new(e.kind(), e.to_string()),
        );

        report_fault(&self.section, &self.faults, e);
        let _ = self.watchdog_tx.send(WatchdogSignal::Stop);

        reported
    }
}

impl Drop for ControlLink {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Control link shutdown: {e}");
        }
    }
}

/// Ошибки, после которых отправку можно повторить.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

fn mark_closed(section: &Mutex<LinkSection>) {
    let mut section = section.lock().unwrap_or_else(PoisonError::into_inner);

    if !section.closed {
        section.closed = true;
        info!(
            "Control link closed after {} commands",
            section.seq.wrapping_sub(FIRST_SEQUENCE)
        );
    }
}

/// Закрывает канал и публикует отказ. Замок секции к этому моменту снят.
fn report_fault(
    section: &Mutex<LinkSection>,
    faults: &LatestState,
    e: io::Error,
) {
    error!("Command socket failed: {e}");

    mark_closed(section);
    faults.record_fault(ClientError::socket(Channel::Command, e));
}

/// Номер, отрисовка, отправка. Вызывается только под замком секции.
fn transmit(
    section: &mut LinkSection,
    command: &AtCommand,
    metrics: &LinkMetrics,
) -> io::Result<u32> {
    let seq = section.seq;
    section.seq = section.seq.wrapping_add(1);

    let line = command.encode(seq);

    match section.socket.send_to(line.as_bytes(), section.target) {
        Ok(_) => {
            section.last_send = Instant::now();
            trace!("-> {}", line.trim_end());

            Ok(seq)
        }
        Err(e) => {
            metrics.send_errors.fetch_add(1, Ordering::Relaxed);
            Err(e)
        }
    }
}

/// Результат проверки простоя.
enum Idle {
    /// Keep-alive отправлен
    Sent,
    /// До истечения периода осталось
    Wait(Duration),
    Closed,
}

/// Отправляет keep-alive, если с последней отправки прошёл целый период.
fn keepalive_if_idle(
    section: &Mutex<LinkSection>,
    period: Duration,
    metrics: &LinkMetrics,
) -> io::Result<Idle> {
    let Ok(mut section) = section.lock() else {
        return Ok(Idle::Closed);
    };

    if section.closed {
        return Ok(Idle::Closed);
    }

    let idle = section.last_send.elapsed();
    if idle < period {
        return Ok(Idle::Wait(period - idle));
    }

    transmit(&mut section, &AtCommand::Comwdg, metrics)?;
    metrics.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    trace!("Keep-alive sent after {idle:?} of silence");

    Ok(Idle::Sent)
}

fn watchdog_loop(
    rx: Receiver<WatchdogSignal>,
    section: Arc<Mutex<LinkSection>>,
    faults: Arc<LatestState>,
    metrics: Arc<LinkMetrics>,
    period: Duration,
) {
    let mut wait = period;

    loop {
        match rx.recv_timeout(wait) {
            Ok(WatchdogSignal::Rearm) => wait = period,
            Ok(WatchdogSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => match keepalive_if_idle(&section, period, &metrics) {
                Ok(Idle::Sent) => wait = period,
                Ok(Idle::Wait(remaining)) => wait = remaining,
                Ok(Idle::Closed) => break,
                Err(e) if is_transient(&e) => {
                    warn!("Keep-alive failed: {e}");
                    wait = period;
                }
                Err(e) => {
                    report_fault(&section, &faults, e);
                    break;
                }
            },
        }
    }
}

//! Поток публикации: переносит свежие кадры и navdata из сетевого потока
//! в общее состояние, доступное пользовательскому коду.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock, PoisonError, RwLock,
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{select, RecvError};
use dronelink_types::{NavdataRecord, Picture};
use log::{debug, error, info};

use crate::{ClientError, ClientResult, LinkMetrics, NetworkChannels};

/// Обработчик первой фатальной ошибки.
pub type FaultHook = Box<dyn Fn(&ClientError) + Send + Sync>;

/// Последние опубликованные значения.
///
/// Читатели получают `Arc` и никогда не видят частично записанный кадр.
#[derive(Default)]
pub struct LatestState {
    image: RwLock<Option<Arc<Picture>>>,
    navdata: RwLock<Option<Arc<NavdataRecord>>>,
    fault: Mutex<Option<Arc<ClientError>>>,
    on_fault: OnceLock<FaultHook>,
}

impl LatestState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish_image(
        &self,
        picture: Arc<Picture>,
    ) {
        *self.image.write().unwrap_or_else(PoisonError::into_inner) = Some(picture);
    }

    pub fn publish_navdata(
        &self,
        record: Arc<NavdataRecord>,
    ) {
        *self.navdata.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
    }

    /// Устанавливает обработчик отказа. Повторная установка игнорируется.
    ///
    /// Обработчик вызывается один раз, в потоке, записавшем первую ошибку,
    /// уже после снятия замка.
    pub fn set_fault_hook(
        &self,
        hook: FaultHook,
    ) {
        if self.on_fault.set(hook).is_err() {
            debug!("Fault hook already installed");
        }
    }

    /// Сохраняет первую фатальную ошибку; последующие игнорируются.
    pub fn record_fault(
        &self,
        fault: ClientError,
    ) {
        let first = {
            let mut slot = self.fault.lock().unwrap_or_else(PoisonError::into_inner);

            if slot.is_some() {
                return;
            }

            let fault = Arc::new(fault);
            *slot = Some(fault.clone());
            fault
        };

        if let Some(hook) = self.on_fault.get() {
            hook(&first);
        }
    }

    /// Последний декодированный кадр.
    pub fn image(&self) -> Option<Arc<Picture>> {
        self.image
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Последняя запись navdata.
    pub fn navdata(&self) -> Option<Arc<NavdataRecord>> {
        self.navdata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fault(&self) -> Option<Arc<ClientError>> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Поток публикации.
pub struct DispatchThread {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DispatchThread {
    /// Запускает поток; `poll` ограничивает ожидание между проверками флага.
    pub fn spawn(
        channels: NetworkChannels,
        state: Arc<LatestState>,
        metrics: Arc<LinkMetrics>,
        poll: Duration,
    ) -> ClientResult<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let handle = std::thread::Builder::new()
            .name("dronelink-dispatch".into())
            .spawn(move || dispatch_loop(channels, &state, &metrics, &stop, poll))?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    /// Флаг остановки. Устанавливается в `true` для завершения потока.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn shutdown(&mut self) -> ClientResult<()> {
        self.stop_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| ClientError::WorkerPanicked("dispatch"))?;
            info!("Dispatch thread stopped");
        }

        Ok(())
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Dispatch shutdown: {e}");
        }
    }
}

fn dispatch_loop(
    channels: NetworkChannels,
    state: &LatestState,
    metrics: &LinkMetrics,
    stop: &AtomicBool,
    poll: Duration,
) {
    while !stop.load(Ordering::Relaxed) {
        select! {
            recv(channels.video) -> msg => match msg {
                Ok(first) => {
                    let newest = channels.video.try_iter().last().unwrap_or(first);
                    state.publish_image(newest);
                    metrics.images_published.fetch_add(1, Ordering::Relaxed);
                }
                Err(RecvError) => break,
            },
            recv(channels.navdata) -> msg => match msg {
                Ok(first) => {
                    let newest = channels.navdata.try_iter().last().unwrap_or(first);
                    state.publish_navdata(newest);
                    metrics.navdata_published.fetch_add(1, Ordering::Relaxed);
                }
                Err(RecvError) => break,
            },
            recv(channels.faults) -> msg => match msg {
                Ok(fault) => {
                    error!("Link fault: {fault}");
                    state.record_fault(fault);
                    return;
                }
                Err(RecvError) => break,
            },
            default(poll) => {}
        }
    }

    // сетевой поток завершился: его ошибка могла прийти последней
    for fault in channels.faults.try_iter() {
        error!("Link fault: {fault}");
        state.record_fault(fault);
    }

    debug!("Dispatch loop finished");
}

//! Сетевой поток: владеет входящими сокетами видео и navdata,
//! декодирует только самую свежую датаграмму каждого вида.
//!
//! Внутри отдельного потока работает однопоточный runtime tokio;
//! ожидание мультиплексирует готовность обоих сокетов и сигнал остановки.

use std::{
    io,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    sync::{atomic::Ordering, Arc},
    thread::JoinHandle,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dronelink_codec::{decode_navdata, VideoDecoder};
use dronelink_types::{NavdataRecord, Picture};
use log::{debug, error, info, warn};
use tokio::{net::UdpSocket, sync::oneshot};

use crate::{Channel, ClientError, ClientResult, LinkConfig, LinkMetrics};

/// Датаграмма, будящая поток видео/navdata на аппарате.
pub const STREAM_HANDSHAKE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Приёмная сторона сетевого потока.
pub struct NetworkChannels {
    pub video: Receiver<Arc<Picture>>,
    pub navdata: Receiver<Arc<NavdataRecord>>,
    /// Фатальные ошибки сокетов
    pub faults: Receiver<ClientError>,
}

struct Outlets {
    video: Sender<Arc<Picture>>,
    navdata: Sender<Arc<NavdataRecord>>,
    faults: Sender<ClientError>,
}

/// Итог опустошения сокета.
struct Drained {
    /// Длина самой свежей датаграммы
    newest: Option<usize>,
    received: u64,
}

/// Поток приёма и декодирования.
pub struct NetworkProcess {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    local_video: SocketAddr,
    local_navdata: SocketAddr,
}

impl NetworkProcess {
    /// Привязывает сокеты, отправляет handshake и запускает поток.
    pub fn spawn(
        config: &LinkConfig,
        metrics: Arc<LinkMetrics>,
    ) -> ClientResult<(Self, NetworkChannels)> {
        let video = bind(config.local_video_addr(), Channel::Video)?;
        let navdata = bind(config.local_navdata_addr(), Channel::Navdata)?;

        let local_video = video
            .local_addr()
            .map_err(|e| ClientError::socket(Channel::Video, e))?;
        let local_navdata = navdata
            .local_addr()
            .map_err(|e| ClientError::socket(Channel::Navdata, e))?;

        handshake(&video, config.video_addr(), Channel::Video)?;
        handshake(&navdata, config.navdata_addr(), Channel::Navdata)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(|e| ClientError::Runtime(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (video_tx, video_rx) = unbounded();
        let (navdata_tx, navdata_rx) = unbounded();
        let (fault_tx, fault_rx) = unbounded();

        let outlets = Outlets {
            video: video_tx,
            navdata: navdata_tx,
            faults: fault_tx,
        };
        let decoder = VideoDecoder::new(config.decoder_config());
        let max_datagram = config.max_datagram;

        let handle = std::thread::Builder::new()
            .name("dronelink-network".into())
            .spawn(move || {
                let result = runtime.block_on(receive_loop(
                    video,
                    navdata,
                    shutdown_rx,
                    &outlets,
                    decoder,
                    metrics,
                    max_datagram,
                ));

                if let Err(e) = result {
                    error!("Network thread failed: {e}");
                    let _ = outlets.faults.send(e);
                }
            })?;

        info!("Network thread started: video on {local_video}, navdata on {local_navdata}");

        Ok((
            Self {
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
                local_video,
                local_navdata,
            },
            NetworkChannels {
                video: video_rx,
                navdata: navdata_rx,
                faults: fault_rx,
            },
        ))
    }

    pub fn local_video_addr(&self) -> SocketAddr {
        self.local_video
    }

    pub fn local_navdata_addr(&self) -> SocketAddr {
        self.local_navdata
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Сигналит остановку и дожидается потока.
    pub fn shutdown(&mut self) -> ClientResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| ClientError::WorkerPanicked("network"))?;
            info!("Network thread stopped");
        }

        Ok(())
    }
}

impl Drop for NetworkProcess {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Network shutdown: {e}");
        }
    }
}

fn bind(
    addr: SocketAddr,
    channel: Channel,
) -> ClientResult<StdUdpSocket> {
    let socket = StdUdpSocket::bind(addr).map_err(|e| ClientError::socket(channel, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ClientError::socket(channel, e))?;

    Ok(socket)
}

fn handshake(
    socket: &StdUdpSocket,
    target: SocketAddr,
    channel: Channel,
) -> ClientResult<()> {
    socket
        .send_to(&STREAM_HANDSHAKE, target)
        .map_err(|e| ClientError::socket(channel, e))?;

    debug!("Sent {channel} handshake to {target}");
    Ok(())
}

async fn receive_loop(
    video: StdUdpSocket,
    navdata: StdUdpSocket,
    mut shutdown: oneshot::Receiver<()>,
    outlets: &Outlets,
    mut decoder: VideoDecoder,
    metrics: Arc<LinkMetrics>,
    max_datagram: usize,
) -> ClientResult<()> {
    let video = UdpSocket::from_std(video).map_err(|e| ClientError::socket(Channel::Video, e))?;
    let navdata =
        UdpSocket::from_std(navdata).map_err(|e| ClientError::socket(Channel::Navdata, e))?;

    let mut video_buf = vec![0u8; max_datagram];
    let mut video_spare = vec![0u8; max_datagram];
    let mut nav_buf = vec![0u8; max_datagram];
    let mut nav_spare = vec![0u8; max_datagram];

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("Network thread received shutdown");
                return Ok(());
            }

            ready = video.readable() => {
                ready.map_err(|e| ClientError::socket(Channel::Video, e))?;

                let drained = drain(&video, &mut video_buf, &mut video_spare)
                    .map_err(|e| ClientError::socket(Channel::Video, e))?;
                count(&metrics, &drained, Channel::Video);

                if let Some(len) = drained.newest {
                    match decoder.decode(&video_buf[..len]) {
                        Ok(picture) => {
                            metrics.video_decoded.fetch_add(1, Ordering::Relaxed);
                            if outlets.video.send(Arc::new(picture)).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            metrics.video_corrupt.fetch_add(1, Ordering::Relaxed);
                            debug!("Dropped corrupt video frame ({len} bytes): {e}");
                        }
                    }
                }
            }

            ready = navdata.readable() => {
                ready.map_err(|e| ClientError::socket(Channel::Navdata, e))?;

                let drained = drain(&navdata, &mut nav_buf, &mut nav_spare)
                    .map_err(|e| ClientError::socket(Channel::Navdata, e))?;
                count(&metrics, &drained, Channel::Navdata);

                if let Some(len) = drained.newest {
                    match decode_navdata(&nav_buf[..len]) {
                        Ok(record) => {
                            metrics.navdata_decoded.fetch_add(1, Ordering::Relaxed);
                            if record.truncated {
                                metrics.navdata_truncated.fetch_add(1, Ordering::Relaxed);
                            }
                            if outlets.navdata.send(Arc::new(record)).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            metrics.navdata_rejected.fetch_add(1, Ordering::Relaxed);
                            warn!("Rejected navdata datagram ({len} bytes): {e}");
                        }
                    }
                }
            }
        }
    }
}

/// Читает сокет до WouldBlock; в `newest` остаётся последняя датаграмма.
fn drain(
    socket: &UdpSocket,
    newest: &mut Vec<u8>,
    spare: &mut Vec<u8>,
) -> io::Result<Drained> {
    let mut drained = Drained {
        newest: None,
        received: 0,
    };

    loop {
        match socket.try_recv_from(spare) {
            Ok((len, _)) => {
                std::mem::swap(newest, spare);
                drained.newest = Some(len);
                drained.received += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(drained),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn count(
    metrics: &LinkMetrics,
    drained: &Drained,
    channel: Channel,
) {
    let superseded = drained.received.saturating_sub(1);

    let (received, dropped) = match channel {
        Channel::Video => (&metrics.video_received, &metrics.video_superseded),
        _ => (&metrics.navdata_received, &metrics.navdata_superseded),
    };

    received.fetch_add(drained.received, Ordering::Relaxed);
    dropped.fetch_add(superseded, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use dronelink_codec::{
        fixtures::{DemoFields, NavdataBuilder, PictureBuilder},
        DecoderConfig,
    };
    use dronelink_types::PictureFormat;

    use super::*;

    fn loopback_config(drone: &StdUdpSocket) -> LinkConfig {
        let port = drone.local_addr().unwrap().port();

        LinkConfig {
            drone_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            navdata_port: port,
            video_port: port,
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_navdata_port: 0,
            local_video_port: 0,
            ..LinkConfig::default()
        }
    }

    #[test]
    fn test_handshake_sent_on_both_channels() {
        let drone = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        drone
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let (mut network, _channels) =
            NetworkProcess::spawn(&loopback_config(&drone), LinkMetrics::new()).unwrap();

        let mut buf = [0u8; 16];
        let mut sources = Vec::new();
        for _ in 0..2 {
            let (n, from) = drone.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], &STREAM_HANDSHAKE);
            sources.push(from);
        }

        sources.sort();
        let mut expected = vec![network.local_video_addr(), network.local_navdata_addr()];
        expected.sort();
        assert_eq!(sources, expected);

        network.shutdown().unwrap();
        assert!(network.is_finished());
    }

    #[test]
    fn test_navdata_decoded_and_forwarded() {
        let drone = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let metrics = LinkMetrics::new();
        let (mut network, channels) =
            NetworkProcess::spawn(&loopback_config(&drone), metrics.clone()).unwrap();

        let datagram = NavdataBuilder::new(1, 5)
            .demo(DemoFields {
                battery: 64,
                ..DemoFields::default()
            })
            .build();
        drone
            .send_to(&datagram, network.local_navdata_addr())
            .unwrap();

        let record = channels
            .navdata
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(record.sequence, 5);
        assert_eq!(record.demo().map(|d| d.battery), Some(64));

        drone
            .send_to(&[0u8; 4], network.local_navdata_addr())
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        network.shutdown().unwrap();
        assert_eq!(metrics.navdata_decoded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.navdata_rejected.load(Ordering::Relaxed), 1);
        assert!(channels.faults.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let drone = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let (mut network, channels) =
            NetworkProcess::spawn(&loopback_config(&drone), LinkMetrics::new()).unwrap();

        network.shutdown().unwrap();
        network.shutdown().unwrap();

        // отправители закрыты вместе с потоком
        assert!(channels.video.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_burst_keeps_only_newest() {
        let localhost = SocketAddr::from(([127, 0, 0, 1], 0));
        let video = bind(localhost, Channel::Video).unwrap();
        let navdata = bind(localhost, Channel::Navdata).unwrap();
        let video_addr = video.local_addr().unwrap();
        let navdata_addr = navdata.local_addr().unwrap();

        // очередь набирается до первого опроса готовности
        let drone = StdUdpSocket::bind(localhost).unwrap();
        for seq in 1..=5 {
            drone
                .send_to(&NavdataBuilder::new(1, seq).build(), navdata_addr)
                .unwrap();
        }
        for frame in 1..=3 {
            let picture = PictureBuilder::new(PictureFormat::Qvga, 1)
                .frame_number(frame)
                .build();
            drone.send_to(&picture, video_addr).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));

        let (video_tx, video_rx) = unbounded();
        let (navdata_tx, navdata_rx) = unbounded();
        let (fault_tx, fault_rx) = unbounded();
        let outlets = Outlets {
            video: video_tx,
            navdata: navdata_tx,
            faults: fault_tx,
        };

        let metrics = LinkMetrics::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .unwrap();

        let loop_metrics = metrics.clone();
        let handle = std::thread::spawn(move || {
            runtime.block_on(receive_loop(
                video,
                navdata,
                shutdown_rx,
                &outlets,
                VideoDecoder::new(DecoderConfig::default()),
                loop_metrics,
                2048,
            ))
        });

        let record = navdata_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(record.sequence, 5);
        assert!(video_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        std::thread::sleep(Duration::from_millis(50));
        assert!(navdata_rx.try_recv().is_err());
        assert!(video_rx.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(metrics.navdata_received.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.navdata_superseded.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.navdata_decoded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.video_received.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.video_superseded.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.video_decoded.load(Ordering::Relaxed), 1);
        assert!(fault_rx.try_recv().is_err());
    }
}

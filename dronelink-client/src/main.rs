use std::{
    net::IpAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use clap::Parser;
use dronelink_client::{parse_duration, save_snapshot, Drone, LinkConfig};
use dronelink_codec::WordOrder;
use log::{error, info, warn, LevelFilter};

#[derive(Parser, Debug)]
#[command(
    name = "dronelink",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a drone link alive and monitor its telemetry and video",
    long_about = None,
)]
struct Cli {
    /// Адрес аппарата
    #[arg(long, default_value = "192.168.1.1")]
    drone_ip: IpAddr,
    #[arg(long, default_value = "5554")]
    navdata_port: u16,
    #[arg(long, default_value = "5555")]
    video_port: u16,
    #[arg(long, default_value = "5556")]
    command_port: u16,
    /// Период keep-alive (200ms, 0.5s)
    #[arg(long, default_value = "200ms", value_parser = parse_duration)]
    watchdog: Duration,
    /// Интервал вывода телеметрии
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    stats_interval: Duration,
    /// Печатать телеметрию строками JSON вместо лога
    #[arg(long)]
    json: bool,
    /// Сохранить последний кадр в PNG при выходе
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Ограничение сессии (секунды). По умолчанию: до Ctrl+C
    #[arg(short, long)]
    duration: Option<u64>,
    /// Слова видеопотока в little-endian
    #[arg(long)]
    little_endian_video: bool,
    /// Пропущенные макроблоки не сохраняют прошлый кадр
    #[arg(long)]
    clear_skipped: bool,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
}

fn report_telemetry(
    drone: &Drone,
    session_start: &Instant,
    json: bool,
) {
    let metrics = drone.metrics();
    let navdata = drone.latest_navdata();

    if json {
        let line = serde_json::json!({
            "elapsed_secs": session_start.elapsed().as_secs_f64(),
            "frame_rate": metrics.frame_rate(session_start),
            "frames_decoded": metrics.video_decoded.load(Ordering::Relaxed),
            "frames_corrupt": metrics.video_corrupt.load(Ordering::Relaxed),
            "navdata": navdata.as_deref(),
        });
        println!("{line}");
        return;
    }

    match navdata.as_deref().and_then(|r| r.demo().map(|d| (r, d))) {
        Some((record, demo)) => info!(
            "seq={} state={:?} battery={}% alt={}mm theta={} phi={} psi={} fps={:.1}",
            record.sequence,
            demo.control_state(),
            demo.battery,
            demo.altitude,
            demo.theta,
            demo.phi,
            demo.psi,
            metrics.frame_rate(session_start)
        ),
        None => info!(
            "No demo navdata yet ({} datagrams received), fps={:.1}",
            metrics.navdata_received.load(Ordering::Relaxed),
            metrics.frame_rate(session_start)
        ),
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .format_timestamp_secs()
        .init();

    let config = LinkConfig {
        drone_ip: cli.drone_ip,
        navdata_port: cli.navdata_port,
        video_port: cli.video_port,
        command_port: cli.command_port,
        watchdog_period: cli.watchdog,
        video_word_order: if cli.little_endian_video {
            WordOrder::LittleEndian
        } else {
            WordOrder::BigEndian
        },
        retain_skipped_macroblocks: !cli.clear_skipped,
        ..LinkConfig::default()
    };

    let drone = match Drone::connect(config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to connect: {e}");
            std::process::exit(1);
        }
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_ctrlc = stop_flag.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C — принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, halting link...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Drone         : {}", cli.drone_ip);
    info!("  Command       : {}", drone.local_command_addr());
    info!("  Video         : {}", drone.local_video_addr());
    info!("  Navdata       : {}", drone.local_navdata_addr());
    info!("  Keep-alive    : {:?}", cli.watchdog);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let session_start = Instant::now();
    let mut last_stats = Instant::now();
    let tick = Duration::from_millis(100);
    let mut failed = false;

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        if let Some(dur) = cli.duration {
            if session_start.elapsed().as_secs() >= dur {
                info!("Duration limit reached ({dur}s)");
                break;
            }
        }

        if let Some(fault) = drone.fault() {
            error!("Link failed: {fault}");
            failed = true;
            break;
        }

        if last_stats.elapsed() >= cli.stats_interval {
            report_telemetry(&drone, &session_start, cli.json);
            last_stats = Instant::now();
        }

        std::thread::sleep(tick);
    }

    if let Some(path) = &cli.snapshot {
        match drone.latest_picture() {
            Some(picture) => {
                if let Err(e) = save_snapshot(&picture, path) {
                    warn!("{e}");
                }
            }
            None => warn!("No video frame received, snapshot skipped"),
        }
    }

    if let Err(e) = drone.halt() {
        error!("Halt failed: {e}");
        failed = true;
    }

    let metrics = drone.metrics();
    let summary = metrics.summary(&session_start);
    info!("\n{summary}");

    if summary.send_errors > 0 {
        warn!("⚠ {} command sends failed", summary.send_errors);
    }

    if failed {
        std::process::exit(1);
    }

    info!("✓ Session complete");
}

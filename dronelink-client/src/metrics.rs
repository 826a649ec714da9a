use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Счётчики канала связи, обновляемые lock-free из нескольких потоков.
#[derive(Debug, Default)]
pub struct LinkMetrics {
    pub commands_sent: AtomicU64,
    pub keepalives_sent: AtomicU64,
    pub send_errors: AtomicU64,

    pub video_received: AtomicU64,
    /// Датаграммы, вытесненные более свежими до декодирования
    pub video_superseded: AtomicU64,
    pub video_decoded: AtomicU64,
    pub video_corrupt: AtomicU64,

    pub navdata_received: AtomicU64,
    pub navdata_superseded: AtomicU64,
    pub navdata_decoded: AtomicU64,
    pub navdata_rejected: AtomicU64,
    pub navdata_truncated: AtomicU64,

    pub images_published: AtomicU64,
    pub navdata_published: AtomicU64,
}

/// Снимок метрик для вывода и тестов.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub commands_sent: u64,
    pub keepalives_sent: u64,
    pub send_errors: u64,
    pub video_received: u64,
    pub video_superseded: u64,
    pub video_decoded: u64,
    pub video_corrupt: u64,
    pub navdata_received: u64,
    pub navdata_superseded: u64,
    pub navdata_decoded: u64,
    pub navdata_rejected: u64,
    pub navdata_truncated: u64,
    pub images_published: u64,
    pub navdata_published: u64,
    pub frame_rate: f64,
    pub corrupt_rate_pct: f64,
}

impl LinkMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Декодированных кадров в секунду.
    pub fn frame_rate(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.video_decoded.load(Ordering::Relaxed) as f64 / secs
    }

    /// Доля повреждённых кадров среди декодированных попыток (0.0-100.0).
    pub fn corrupt_rate_pct(&self) -> f64 {
        let ok = self.video_decoded.load(Ordering::Relaxed);
        let bad = self.video_corrupt.load(Ordering::Relaxed);
        let total = ok + bad;

        if total == 0 {
            0.0
        } else {
            bad as f64 / total as f64 * 100.0
        }
    }

    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            video_received: self.video_received.load(Ordering::Relaxed),
            video_superseded: self.video_superseded.load(Ordering::Relaxed),
            video_decoded: self.video_decoded.load(Ordering::Relaxed),
            video_corrupt: self.video_corrupt.load(Ordering::Relaxed),
            navdata_received: self.navdata_received.load(Ordering::Relaxed),
            navdata_superseded: self.navdata_superseded.load(Ordering::Relaxed),
            navdata_decoded: self.navdata_decoded.load(Ordering::Relaxed),
            navdata_rejected: self.navdata_rejected.load(Ordering::Relaxed),
            navdata_truncated: self.navdata_truncated.load(Ordering::Relaxed),
            images_published: self.images_published.load(Ordering::Relaxed),
            navdata_published: self.navdata_published.load(Ordering::Relaxed),
            frame_rate: self.frame_rate(elapsed),
            corrupt_rate_pct: self.corrupt_rate_pct(),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  Commands      : {} (+{} keep-alive, {} errors)",
            self.commands_sent, self.keepalives_sent, self.send_errors
        )?;
        writeln!(
            f,
            "  Video         : {} rx, {} superseded, {} decoded, {} corrupt ({:.2}%)",
            self.video_received,
            self.video_superseded,
            self.video_decoded,
            self.video_corrupt,
            self.corrupt_rate_pct
        )?;
        writeln!(
            f,
            "  Navdata       : {} rx, {} superseded, {} decoded, {} rejected, {} truncated",
            self.navdata_received,
            self.navdata_superseded,
            self.navdata_decoded,
            self.navdata_rejected,
            self.navdata_truncated
        )?;
        writeln!(
            f,
            "  Published     : {} images, {} navdata",
            self.images_published, self.navdata_published
        )?;
        writeln!(f, "  Frame rate    : {:.1} fps", self.frame_rate)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}

use crate::config::LoadConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Загруженность по результатам последнего замера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Calm,
    Busy,
}

/// Оценка загрузки по опозданию периодической задачи.
///
/// Если задача вызывается заметно позже своего периода, "давление" растёт,
/// иначе падает. Выход за пороги переключает состояние и сбрасывает давление.
pub struct LoadMonitor {
    interval: Duration,
    excessive_pct: f64,
    pressure_high: i32,
    pressure_low: i32,
    warning_count_max: u32,
    previous: Option<Instant>,
    pressure: i32,
    warnings: u32,
    state: LoadState,
}

impl LoadMonitor {
    pub fn new(config: &LoadConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            excessive_pct: config.excessive_pct,
            pressure_high: config.pressure_high,
            pressure_low: config.pressure_low,
            warning_count_max: config.warning_count_max,
            previous: None,
            pressure: 0,
            warnings: 0,
            state: LoadState::Calm,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn measure(&mut self, now: Instant) -> LoadState {
        let excessive = self.interval.mul_f64(self.excessive_pct);
        let late = self
            .previous
            .is_some_and(|previous| now.duration_since(previous) > excessive);
        self.previous = Some(now);

        if late {
            self.pressure += 1;
        } else {
            self.pressure -= 1;
        }

        if self.pressure > self.pressure_high {
            if self.state == LoadState::Calm {
                self.state = LoadState::Busy;
                if self.warnings < self.warning_count_max {
                    self.warnings += 1;
                    warn!("Система перегружена, планировщик не успевает");
                }
            }
            self.pressure = 0;
        } else if self.pressure < self.pressure_low {
            if self.state == LoadState::Busy {
                self.state = LoadState::Calm;
                info!("Нагрузка вернулась в норму");
            }
            self.pressure = 0;
        }

        self.state
    }
}

use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{error, warn};

/// Сообщение пользователю о фатальной ошибке
pub trait FatalReporter: Send + Sync {
    fn report_fatal(&self, title: &str, message: &str);
}

/// Показывает уведомление через notify-send
pub struct DesktopNotifier;

impl FatalReporter for DesktopNotifier {
    fn report_fatal(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);

        let spawned = Command::new("notify-send")
            .args(["-u", "critical", "-a", "xsnow-rust", title, message])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        if let Err(e) = spawned {
            warn!("Не удалось показать уведомление через notify-send: {}", e);
        }
    }
}

/// Режим сухого запуска: ошибка только пишется в лог
pub struct LogOnlyNotifier;

impl FatalReporter for LogOnlyNotifier {
    fn report_fatal(&self, title: &str, message: &str) {
        error!("[DRY RUN] {}: {}", title, message);
    }
}

/// Factory function to create an appropriate fatal reporter based on the dry_run flag
pub fn create_fatal_reporter(dry_run: bool) -> Arc<dyn FatalReporter> {
    if dry_run {
        Arc::new(LogOnlyNotifier)
    } else {
        Arc::new(DesktopNotifier)
    }
}

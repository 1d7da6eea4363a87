use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
mod services;
mod utils;

use config::{Config, Stacking};
use services::window_system::{Desktop, OverlayInfo, OverlayRequest};
use services::{
    create_event_pump, create_fatal_reporter, create_window_system, EventDispatcher,
    FallenSnowLedger, LoadMonitor, ReconcileSettings, Reconciler, TrackerContext,
};
use utils::{Mainloop, Priority, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "xsnow-rust")]
#[command(about = "Снег на рабочем столе X11, который копится на окнах и падает при их перетаскивании")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "xsnow.toml")]
    config: String,

    /// Режим сухого запуска (эмуляция оконной системы)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Arc::new(Config::load(&args.config)?);

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск xsnow-rust v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальная оконная система не используется");
    }

    let shutdown = Shutdown::new();
    let desktop = create_window_system(&config, args.dry_run)?;
    let overlay = create_overlay(desktop.as_ref(), &config)?;

    let ledger = Arc::new(FallenSnowLedger::for_overlay(overlay.window));
    let context = Arc::new(TrackerContext::new(
        desktop.clone(),
        ledger.clone(),
        overlay,
        shutdown.clone(),
    ));

    // Периодические задачи
    let mut mainloop = Mainloop::new(shutdown.clone());

    let mut reconciler = Reconciler::new(
        context.clone(),
        create_fatal_reporter(args.dry_run),
        ReconcileSettings::from_config(&config),
        Duration::from_millis(config.windows.probe_timeout_ms),
    );
    mainloop.add_method(
        "reconciler",
        Priority::Default,
        Duration::from_millis(config.windows.update_interval_ms),
        move || reconciler.tick_blocking(),
    );

    if !config.overlay.double_buffered && !overlay.is_root {
        let context = context.clone();
        mainloop.add_method(
            "expose",
            Priority::Low,
            Duration::from_millis(config.overlay.expose_interval_ms),
            move || {
                let geometry = context.state.lock().overlay_geometry;
                if let Err(e) = context.system.send_expose(overlay.window, geometry) {
                    warn!("Не удалось отправить Expose окну снега: {}", e);
                }
                true
            },
        );
    }

    let mut load = LoadMonitor::new(&config.load);
    mainloop.add_method("load-measure", Priority::Default, load.interval(), move || {
        load.measure(Instant::now());
        true
    });

    let pump = create_event_pump(
        desktop.clone(),
        EventDispatcher::new(context.clone()),
        shutdown.clone(),
        Duration::from_millis(config.windows.event_poll_interval_ms),
        args.dry_run,
    );

    info!("Все компоненты инициализированы");

    // Запуск всех сервисов параллельно
    let pump_handle = tokio::spawn(async move {
        if let Err(e) = pump.run().await {
            error!("Ошибка в EventPump: {}", e);
        }
    });
    let mainloop_handle = tokio::spawn(mainloop.run());

    info!("Все сервисы запущены");

    // Ожидание сигнала завершения или фатальной ошибки
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        },
        _ = shutdown.wait() => warn!("Завершение по фатальной ошибке"),
    }

    info!("Завершение работы...");
    shutdown.request("завершение процесса");

    // Ожидаем завершения задач (с таймаутом)
    let shutdown_timeout = Duration::from_secs(5);
    let shutdown_result = tokio::time::timeout(shutdown_timeout, async {
        let _ = pump_handle.await;
        let _ = mainloop_handle.await;
    })
    .await;

    match shutdown_result {
        Ok(_) => info!("Все сервисы завершили работу корректно"),
        Err(_) => warn!("Таймаут при завершении сервисов"),
    }

    let stats = ledger.stats();
    info!(
        "xsnow-rust завершил работу: окон со снегом {}, полных стряхиваний {}",
        stats.surfaces, stats.cleared_all
    );
    Ok(())
}

/// Создаёт окно снега или берёт корневое окно и задаёт положение в стеке
fn create_overlay(desktop: &dyn Desktop, config: &Config) -> Result<OverlayInfo> {
    if config.overlay.use_root_window {
        let root = desktop.root();
        let geometry = desktop.window_geometry(root)?;
        info!("Снег рисуется в корневом окне {}", root);
        return Ok(OverlayInfo {
            window: root,
            geometry,
            is_root: true,
            transparent: false,
        });
    }

    let request = OverlayRequest {
        screen: config.display.screen,
        sticky: config.overlay.sticky,
        stacking: config.overlay.stacking(),
        dock: config.overlay.dock,
    };
    let overlay = desktop.create_overlay_window(request)?;

    match request.stacking {
        Stacking::Below => desktop.set_stacking_below(overlay.window)?,
        Stacking::Above => desktop.set_stacking_above(overlay.window)?,
        Stacking::Unchanged => {}
    }

    Ok(OverlayInfo {
        transparent: overlay.transparent && config.overlay.transparent,
        ..overlay
    })
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}

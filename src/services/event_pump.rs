use crate::error::Result;
use crate::events::WindowEvent;
use crate::services::dispatcher::EventDispatcher;
use crate::services::window_system::Desktop;
use crate::utils::Shutdown;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Trait for event pumps that feed window system events to the dispatcher
#[async_trait::async_trait]
pub trait EventPumpTrait {
    /// Run the event pump until shutdown
    async fn run(self: Box<Self>) -> Result<()>;
}

/// Factory function to create an appropriate event pump based on the dry_run flag
pub fn create_event_pump(
    system: Arc<dyn Desktop>,
    dispatcher: EventDispatcher,
    shutdown: Shutdown,
    poll_interval: Duration,
    dry_run: bool,
) -> Box<dyn EventPumpTrait + Send> {
    let pump = EventPump {
        system,
        dispatcher,
        shutdown,
        poll_interval,
    };
    if dry_run {
        Box::new(DryRunEventPump { pump })
    } else {
        Box::new(pump)
    }
}

pub struct EventPump {
    system: Arc<dyn Desktop>,
    dispatcher: EventDispatcher,
    shutdown: Shutdown,
    poll_interval: Duration,
}

impl EventPump {
    async fn pump(self, mut observe: impl FnMut(&WindowEvent) + Send) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.wait() => break,
            }

            // Разбираем всё, что накопилось с прошлого опроса
            loop {
                match self.system.poll_event() {
                    Ok(Some(event)) => {
                        observe(&event);
                        self.dispatcher.dispatch(&event);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Соединение с оконной системой потеряно: {}", e);
                        self.shutdown.request("потеряно соединение с оконной системой");
                        return Err(e);
                    }
                }
            }
        }

        info!("EventPump остановлен");
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventPumpTrait for EventPump {
    async fn run(self: Box<Self>) -> Result<()> {
        info!("EventPump запущен (опрос каждые {:?})", self.poll_interval);
        self.pump(|_| {}).await
    }
}

/// Dry-run: те же события, но каждое пишется в лог
pub struct DryRunEventPump {
    pump: EventPump,
}

#[async_trait::async_trait]
impl EventPumpTrait for DryRunEventPump {
    async fn run(self: Box<Self>) -> Result<()> {
        info!("Dry-run режим - события оконной системы эмулируются");
        self.pump
            .pump(|event| info!("Dry-run: событие {}", event))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Rect, WindowId, WindowRecord};
    use crate::services::fallen_snow::FallenSnowLedger;
    use crate::services::tracker_context::TrackerContext;
    use crate::services::window_system::{OverlayInfo, SimulatedDesktop};

    #[tokio::test(start_paused = true)]
    async fn test_pump_drains_queue_and_stops_on_shutdown() {
        let desktop = Arc::new(SimulatedDesktop::new());
        let shutdown = Shutdown::new();
        let context = Arc::new(TrackerContext::new(
            desktop.clone(),
            Arc::new(FallenSnowLedger::default()),
            OverlayInfo {
                window: WindowId(0x0500_0000),
                geometry: Rect::new(0, 0, 1920, 1080),
                is_root: false,
                transparent: true,
            },
            shutdown.clone(),
        ));

        let app = WindowId(0x0100_0001);
        desktop.add_window(WindowRecord::new(app, Rect::new(0, 0, 100, 100)));
        desktop.push_event(WindowEvent::ActiveAppChanged { window: Some(app) });
        desktop.push_event(WindowEvent::Destroyed { window: WindowId(0x42) });

        let pump = create_event_pump(
            desktop.clone(),
            EventDispatcher::new(context.clone()),
            shutdown.clone(),
            Duration::from_millis(10),
            false,
        );
        let handle = tokio::spawn(pump.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(context.snapshot.lookup(app).is_some());
        assert_eq!(context.state.lock().drag.active_app().window, Some(app));

        shutdown.request("тест");
        handle.await.unwrap().unwrap();
    }
}

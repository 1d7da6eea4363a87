use crate::trace_if_enabled;
use crate::utils::Shutdown;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Порядок выполнения задач, готовых в один и тот же момент
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Default,
    Low,
}

type Callback = Box<dyn FnMut() -> bool + Send>;

struct Task {
    name: &'static str,
    priority: Priority,
    period: Duration,
    next_due: Instant,
    callback: Callback,
}

/// Планировщик периодических задач.
///
/// Задача возвращает `true`, чтобы остаться в расписании, и `false`,
/// чтобы больше не вызываться.
pub struct Mainloop {
    tasks: Vec<Task>,
    shutdown: Shutdown,
}

impl Mainloop {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown,
        }
    }

    pub fn add_method<F>(&mut self, name: &'static str, priority: Priority, period: Duration, callback: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        debug!("Задача {} добавлена: {:?}, период {:?}", name, priority, period);
        self.tasks.push(Task {
            name,
            priority,
            period,
            next_due: Instant::now() + period,
            callback: Box::new(callback),
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub async fn run(mut self) {
        info!("Mainloop запущен: {} задач", self.len());

        loop {
            if self.shutdown.is_requested() {
                info!("Mainloop остановлен по запросу завершения");
                break;
            }
            let Some(wake_at) = self.tasks.iter().map(|t| t.next_due).min() else {
                info!("Mainloop остановлен: задач не осталось");
                break;
            };

            tokio::select! {
                _ = sleep_until(wake_at) => {}
                _ = self.shutdown.wait() => continue,
            }

            self.run_due(Instant::now());
        }
    }

    fn run_due(&mut self, now: Instant) {
        let mut due: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| self.tasks[i].next_due <= now)
            .collect();
        due.sort_by_key(|&i| self.tasks[i].priority);

        let mut finished = Vec::new();
        for index in due {
            let task = &mut self.tasks[index];
            task.next_due = now + task.period;
            trace_if_enabled!("Выполняется задача {}", task.name);
            if !(task.callback)() {
                debug!("Задача {} завершилась", task.name);
                finished.push(index);
            }
        }

        finished.sort_unstable();
        for index in finished.into_iter().rev() {
            self.tasks.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_due_tasks_run_in_priority_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut mainloop = Mainloop::new(Shutdown::new());

        for (name, priority) in [("low", Priority::Low), ("high", Priority::High), ("default", Priority::Default)] {
            let order = order.clone();
            mainloop.add_method(name, priority, Duration::from_millis(100), move || {
                order.lock().push(name);
                false
            });
        }

        mainloop.run().await;
        assert_eq!(*order.lock(), vec!["high", "default", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_it_returns_false() {
        let calls = Arc::new(Mutex::new(0u32));
        let mut mainloop = Mainloop::new(Shutdown::new());

        let counter = calls.clone();
        mainloop.add_method("count", Priority::Default, Duration::from_millis(10), move || {
            let mut calls = counter.lock();
            *calls += 1;
            *calls < 5
        });
        assert_eq!(mainloop.len(), 1);

        mainloop.run().await;
        assert_eq!(*calls.lock(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periods_are_respected() {
        let fast = Arc::new(Mutex::new(0u32));
        let shutdown = Shutdown::new();
        let mut mainloop = Mainloop::new(shutdown.clone());

        let counter = fast.clone();
        mainloop.add_method("fast", Priority::Default, Duration::from_millis(10), move || {
            *counter.lock() += 1;
            true
        });
        let stopper = shutdown.clone();
        mainloop.add_method("stop", Priority::Low, Duration::from_millis(105), move || {
            stopper.request("тест");
            false
        });

        mainloop.run().await;
        assert_eq!(*fast.lock(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let shutdown = Shutdown::new();
        let mut mainloop = Mainloop::new(shutdown.clone());
        mainloop.add_method("forever", Priority::Default, Duration::from_secs(3600), || true);

        let handle = tokio::spawn(mainloop.run());
        tokio::task::yield_now().await;
        shutdown.request("тест");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

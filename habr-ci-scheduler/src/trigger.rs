use std::future::Future;
use std::sync::Arc;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use crate::error::{ScheduleError, ScheduleResult};
use crate::schedule::CronSchedule;

/// Sorgente dell'ora corrente
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Orologio di sistema, ora locale come il cron di Jenkins
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Avvia un job ad ogni istante dello schedule.
///
/// Ogni run viene attesa prima di calcolare l'istante successivo: le run non si
/// sovrappongono mai e gli istanti persi durante una run lunga vengono saltati.
pub struct Trigger {
    schedule: CronSchedule,
    clock: Arc<dyn Clock>,
}

impl Trigger {
    pub fn new(schedule: CronSchedule) -> Self {
        Self::with_clock(schedule, Arc::new(SystemClock))
    }

    pub fn with_clock(schedule: CronSchedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedule,
            clock,
        }
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Prossimo istante dopo `after`, mai prima di `last_fire`
    fn next_fire(&self, after: DateTime<Local>, last_fire: Option<DateTime<Local>>) -> ScheduleResult<DateTime<Local>> {
        let after = match last_fire {
            Some(last) if last > after => last,
            _ => after,
        };
        self.schedule.next_after(&after)
            .ok_or_else(|| ScheduleError::exhausted(self.schedule.expression()))
    }

    /// Loop fino a `shutdown`; ritorna il numero di run avviate.
    ///
    /// Lo shutdown viene osservato solo tra una run e l'altra: una run in corso
    /// arriva sempre fino al report.
    pub async fn run<F, Fut, S>(&self, mut job: F, shutdown: S) -> ScheduleResult<usize>
    where
        F: FnMut(DateTime<Local>) -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut runs = 0;
        let mut last_fire = None;

        loop {
            let now = self.clock.now();
            let fire = self.next_fire(now, last_fire)?;
            info!("Next run of schedule '{}' at {}", self.schedule, fire);

            let wait = (fire - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("Trigger stopped after {} run(s)", runs);
                    return Ok(runs);
                }
            }

            debug!("Schedule '{}' fired for {}", self.schedule, fire);
            job(fire).await;
            runs += 1;
            last_fire = Some(fire);

            let missed = self.schedule.fire_times_between(&fire, &self.clock.now());
            if !missed.is_empty() {
                warn!(
                    "Skipping {} fire time(s) missed while the run was active (first at {})",
                    missed.len(),
                    missed[0]
                );
            }
        }
    }
}

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::state::SharedState;

/// Background maintenance: runs the session/audit sweep on a fixed
/// interval, independent of any request.
pub struct Scheduler {
    state: Arc<SharedState>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub const fn new(state: Arc<SharedState>, config: SchedulerConfig) -> Self {
        Self { state, config }
    }

    pub async fn start(&self) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await?;

        let interval = Duration::from_secs(u64::from(self.config.sweep_interval_minutes) * 60);
        let auth = self.state.auth_service.clone();

        let sweep_job = Job::new_repeated_async(interval, move |_id, _sched| {
            let auth = auth.clone();
            Box::pin(async move {
                match auth.sweep().await {
                    Ok(stats) => {
                        if stats.sessions_expired > 0
                            || stats.sessions_pruned > 0
                            || stats.audit_events_pruned > 0
                        {
                            info!(
                                "Sweep: {} sessions expired, {} pruned, {} audit events pruned",
                                stats.sessions_expired,
                                stats.sessions_pruned,
                                stats.audit_events_pruned
                            );
                        }
                    }
                    Err(e) => error!("Session sweep failed: {e}"),
                }
            })
        })?;

        sched.add(sweep_job).await?;
        sched.start().await?;

        info!(
            "Scheduler started (sweep every {} minutes)",
            self.config.sweep_interval_minutes
        );

        Ok(sched)
    }
}

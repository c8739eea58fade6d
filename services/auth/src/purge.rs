//! Scheduled removal of expired sessions, tokens and challenges

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::service::AuthService;

/// Start the purge job on `schedule` (six-field cron expression).
///
/// The returned scheduler must be kept alive for the job to keep running.
pub async fn start(auth: AuthService, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_, _| {
        let auth = auth.clone();
        Box::pin(async move {
            match auth.purge_expired().await {
                Ok(report) if report.total() > 0 => info!(
                    sessions = report.sessions,
                    verification_tokens = report.verification_tokens,
                    reset_tokens = report.reset_tokens,
                    challenges = report.challenges,
                    trusted_devices = report.trusted_devices,
                    "Purged expired rows"
                ),
                Ok(_) => {}
                Err(e) => error!("Failed to purge expired rows: {:#}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Started purge scheduler with schedule: {}", schedule);
    Ok(scheduler)
}

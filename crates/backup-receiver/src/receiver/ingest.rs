use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::{
    BackupRecord, Context, ServerMetadata,
    payload::{self, PayloadError},
};

use super::{Accepted, IngestError, Receiver, Submission};

impl Receiver {
    /// Prepare the backup directory and check the daily limit for `today`. Runs before the body
    /// is read and again before it is stored.
    pub fn admit(&self, context: &mut Context, today: NaiveDate) -> Result<(), IngestError> {
        self.prepare_directory(context)?;

        context.current_context = "Rate Limit";

        let maximum = self.config.limits.maximum_backups_per_day;
        let accepted_today = self.rate_limiter.check(today).unwrap_or_else(|error| {
            warn!("{context}Could not read today's counter, treating it as 0: {error}");
            0
        });

        if accepted_today >= maximum {
            warn!("{context}Exceeded daily limit of {maximum}");
            return Err(IngestError::LimitExceeded(maximum));
        }

        Ok(())
    }

    /// Validate, enrich and store a submitted backup.
    pub fn ingest(
        &self,
        context: &mut Context,
        submission: &Submission,
    ) -> Result<Accepted, IngestError> {
        self.ingest_at(context, submission, Local::now())
    }

    /// Validate, enrich and store a backup submitted at `received_at`.
    pub fn ingest_at(
        &self,
        context: &mut Context,
        submission: &Submission,
        received_at: DateTime<Local>,
    ) -> Result<Accepted, IngestError> {
        let today = received_at.date_naive();

        self.authorize(context, submission.client)?;
        self.admit(context, today)?;

        // Validate payload
        let payload = {
            context.current_context = "Validate Payload";

            payload::validate(
                &submission.body,
                self.config.limits.maximum_payload_bytes,
            )
            .inspect_err(|e| match e {
                PayloadError::TooLarge { .. } => warn!("{context}Exceeded payload size limit: {e}"),
                _ => warn!("{context}Invalid payload: {e}"),
            })?
        };
        let size = payload.size;

        // Persist backup
        let filename = {
            context.current_context = "Persist Backup";

            let server_metadata = ServerMetadata::new(
                received_at,
                submission.server,
                submission.client,
                submission.user_agent.as_deref(),
                size,
            );
            let record = BackupRecord::new(payload, received_at, server_metadata);

            self.store
                .put(&record)
                .inspect_err(|e| error!("{context}Could not save backup: {e}"))
                .map_err(IngestError::PersistFailed)?
        };

        context.backup = Some(filename.clone());
        info!("{context}Saved backup ({size} bytes)");

        // The backup is stored, failures from here on are logged but do not reject it.
        context.current_context = "Count Backup";
        match self.rate_limiter.increment(today) {
            Ok(count) => debug!("{context}{count} backups accepted today"),
            Err(error) => error!("{context}Could not update today's counter: {error}"),
        }

        context.current_context = "Activity Log";
        if let Err(error) =
            self.activity_log
                .append(received_at, &filename, size, submission.client)
        {
            error!("{context}Could not append to the activity log: {error}");
        }

        Ok(Accepted {
            filename,
            received_at,
            size,
        })
    }
}

//! Message routing: admin commands go to [`AdminCommands`], `/start` and
//! plain messages are campaign input for the scheduler, other commands are
//! ignored.

use daycycle_core::IncomingMessage;
use daycycle_scheduler::DayCycleScheduler;

use crate::admin::AdminCommands;

pub struct Bot {
    scheduler: DayCycleScheduler,
    admin: AdminCommands,
}

impl Bot {
    pub fn new(scheduler: DayCycleScheduler, admin: AdminCommands) -> Self {
        Self { scheduler, admin }
    }

    pub async fn handle(&self, message: IncomingMessage) {
        let participant = message.participant;
        if let Some((command, args)) = message.command() {
            match self.admin.dispatch(participant, &command, &args).await {
                Ok(true) => {
                    tracing::info!("🛠️ /{command} from {participant}");
                    return;
                }
                Ok(false) if command == "start" => {}
                Ok(false) => {
                    tracing::debug!("Ignoring unknown command /{command} from {participant}");
                    return;
                }
                Err(e) => {
                    tracing::error!("❌ /{command} from {participant} failed: {e}");
                    return;
                }
            }
        }

        if let Err(e) = self.scheduler.handle_message(message).await {
            tracing::error!("❌ Message from {participant} not processed: {e}");
        }
    }
}

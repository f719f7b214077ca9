use super::*;

impl App {
    pub fn init(&mut self) {
        if self.wizard.application_id().trim().is_empty() {
            self.report_error(
                "No application selected",
                "set integration.application_id or CHATBUILDER_APPLICATION_ID",
            );
        }
        tracing::info!(
            "Opening {} setup for {}",
            self.wizard.state().provider(),
            self.wizard.application_id()
        );
        self.wizard.open();
    }

    /// One event-loop tick: apply finished remote calls and collect what the
    /// wizard emitted.
    pub fn process_events(&mut self) {
        self.wizard.pump();

        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                WizardEvent::Connected { ref workspace_name } => {
                    tracing::info!(
                        "Integration connected to {}",
                        workspace_name.as_deref().unwrap_or("workspace")
                    );
                    self.clear_error();
                }
                WizardEvent::Disconnected => {
                    tracing::info!("Integration disconnected");
                    self.clear_error();
                }
                WizardEvent::Close => {
                    self.should_quit = true;
                }
            }
            self.event_log.push_front(LoggedEvent {
                event,
                at: Utc::now(),
            });
            self.event_log.truncate(MAX_LOGGED_EVENTS);
        }

        while let Ok(notification) = self.toast_rx.try_recv() {
            self.toasts.push_front(notification);
            self.toasts.truncate(MAX_TOASTS);
        }

        self.expire_toasts(Utc::now());
    }

    pub fn expire_toasts(&mut self, now: chrono::DateTime<Utc>) {
        let ttl = chrono::Duration::seconds(self.config.ui.toast_seconds as i64);
        self.toasts.retain(|t| now - t.at < ttl);
    }

    pub fn current_toast(&self) -> Option<&Notification> {
        self.toasts.front()
    }
}

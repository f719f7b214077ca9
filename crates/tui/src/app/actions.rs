use super::*;

impl App {
    pub(super) fn primary_action(&mut self) {
        match self.step() {
            WizardStep::Loading => {}
            WizardStep::CreateApp => self.wizard.confirm_app_created(),
            WizardStep::Credentials => self.wizard.submit_credentials(),
            WizardStep::Install => self.wizard.start_authorization(),
            WizardStep::Connected => self.close_dialog(),
        }
    }

    pub(super) fn close_dialog(&mut self) {
        self.wizard.close();
    }

    pub(super) fn go_back(&mut self) {
        self.wizard.back();
        if self.step() == WizardStep::Credentials {
            self.focused_field = CredentialField::ClientId;
        }
    }

    pub(super) fn open_console(&mut self) {
        let Some(url) = self.guide.console_url.clone() else {
            return;
        };
        match self.opener.open_page(&url) {
            Ok(()) => self.clear_error(),
            Err(e) => self.report_error("Could not open the app console", e),
        }
    }

    pub(super) fn popup_closed_by_user(&mut self) {
        if self.wizard.state().is_authorizing() && !self.opener.mark_closed() {
            // The browser never opened a window for this attempt.
            self.wizard.abandon_authorization();
        }
    }

    pub(super) fn type_char(&mut self, c: char) {
        let field = self.focused_field;
        self.wizard.form_mut().field_mut(field).push(c);
    }

    pub(super) fn backspace(&mut self) {
        let field = self.focused_field;
        self.wizard.form_mut().field_mut(field).pop();
    }

    pub(super) fn focus_next_field(&mut self) {
        self.focused_field = self.focused_field.next();
    }

    pub(super) fn focus_previous_field(&mut self) {
        self.focused_field = self.focused_field.previous();
    }
}

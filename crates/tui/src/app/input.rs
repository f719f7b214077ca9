use super::*;

impl App {
    pub fn handle_event(&mut self, event: Event) -> Result<bool> {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key_event(key),
            Event::Resize(_, _) => Ok(false),
            _ => Ok(false),
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl && key.code == KeyCode::Char('q') {
            return Ok(true);
        }

        let editing = self.step() == WizardStep::Credentials;
        if key.code == KeyCode::F(1) || (!editing && key.code == KeyCode::Char('?')) {
            self.show_help = !self.show_help;
            return Ok(false);
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter) {
                self.show_help = false;
            }
            return Ok(false);
        }

        if self.wizard.state().is_confirming_disconnect() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.wizard.confirm_disconnect()
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.wizard.cancel_disconnect()
                }
                _ => {}
            }
            return Ok(false);
        }

        if key.code == KeyCode::Esc {
            if self.wizard.state().is_authorizing() {
                self.wizard.abandon_authorization();
            } else {
                self.close_dialog();
            }
            return Ok(false);
        }

        if ctrl {
            match key.code {
                KeyCode::Char('b') => self.go_back(),
                KeyCode::Char('r') if editing => self.reveal_secrets = !self.reveal_secrets,
                _ => {}
            }
            return Ok(false);
        }

        if key.code == KeyCode::Enter {
            self.primary_action();
            return Ok(false);
        }

        match self.step() {
            WizardStep::Loading => {}
            WizardStep::CreateApp => {
                if key.code == KeyCode::Char('o') {
                    self.open_console();
                }
            }
            WizardStep::Credentials => match key.code {
                KeyCode::Tab | KeyCode::Down => self.focus_next_field(),
                KeyCode::BackTab | KeyCode::Up => self.focus_previous_field(),
                KeyCode::Backspace => self.backspace(),
                KeyCode::Char(c) => self.type_char(c),
                _ => {}
            },
            WizardStep::Install => {
                if key.code == KeyCode::Char('x') {
                    self.popup_closed_by_user();
                }
            }
            WizardStep::Connected => {
                if key.code == KeyCode::Char('d') {
                    self.wizard.request_disconnect();
                }
            }
        }

        Ok(false)
    }
}

use super::*;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

const STEP_ORDER: [WizardStep; 4] = [
    WizardStep::CreateApp,
    WizardStep::Credentials,
    WizardStep::Install,
    WizardStep::Connected,
];

impl App {
    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let layout = DialogLayout::calculate(area);
        let theme = theme::current();
        let state = self.wizard.state();

        let title = format!(
            " Connect {} - {} ",
            state.provider().display_name(),
            state.step().title()
        );
        frame.render_widget(Clear, layout.frame);
        frame.render_widget(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border())
                .title(Span::styled(title, theme.accent())),
            layout.frame,
        );

        self.render_steps(frame, layout.steps);

        let body = match state.step() {
            WizardStep::Loading => self.loading_lines(),
            WizardStep::CreateApp => self.create_app_lines(),
            WizardStep::Credentials => self.credentials_lines(),
            WizardStep::Install => self.install_lines(),
            WizardStep::Connected => self.connected_lines(),
        };
        frame.render_widget(
            Paragraph::new(body).wrap(Wrap { trim: false }),
            layout.body,
        );

        self.render_banner(frame, layout.banner);
        self.render_footer(frame, layout.footer);

        if state.is_confirming_disconnect() {
            self.render_confirm_disconnect(frame, area);
        }

        if self.show_help {
            self.render_help(frame, area);
        }
    }

    fn render_steps(&self, frame: &mut Frame, area: Rect) {
        let theme = theme::current();
        let current = self.step();
        let mut spans = Vec::new();
        for (i, step) in STEP_ORDER.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" > ", theme.muted()));
            }
            let style = if *step == current {
                theme.accent()
            } else {
                theme.muted()
            };
            spans.push(Span::styled(step.as_str(), style));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)).centered(), area);
    }

    fn loading_lines(&self) -> Vec<Line<'static>> {
        vec![
            Line::default(),
            Line::styled(
                format!(
                    "  Checking {} connection...",
                    self.wizard.state().provider().display_name()
                ),
                theme::current().muted(),
            ),
        ]
    }

    fn create_app_lines(&self) -> Vec<Line<'static>> {
        let theme = theme::current();
        let provider = self.wizard.state().provider().display_name();
        let mut lines = vec![
            Line::default(),
            Line::styled(format!("  1. Create a {provider} app for this chatbot."), theme.text()),
        ];
        if let Some(ref console) = self.guide.console_url {
            lines.push(Line::styled(
                format!("     {console}   [o] open in browser"),
                theme.muted(),
            ));
        }
        lines.push(Line::default());
        lines.push(Line::styled("  2. Add this OAuth redirect URL:", theme.text()));
        lines.push(Line::styled(
            format!("     {}", self.guide.redirect_url),
            theme.accent(),
        ));
        if !self.guide.scopes.is_empty() {
            lines.push(Line::default());
            lines.push(Line::styled("  3. Add these bot token scopes:", theme.text()));
            for chunk in self.guide.scopes.chunks(3) {
                lines.push(Line::styled(
                    format!("     {}", chunk.join(", ")),
                    theme.muted(),
                ));
            }
        }
        lines.push(Line::default());
        lines.push(Line::styled(
            "  Press [Enter] once the app exists.",
            theme.text(),
        ));
        lines
    }

    fn credentials_lines(&self) -> Vec<Line<'static>> {
        let theme = theme::current();
        let state = self.wizard.state();
        let form = state.form();
        let mut lines = vec![
            Line::default(),
            Line::styled(
                "  Copy these from the app's Basic Information page:",
                theme.text(),
            ),
            Line::default(),
        ];

        for field in CredentialField::ALL {
            let value = form.field(field);
            let shown = if value.is_empty() {
                "[not set]".to_string()
            } else if field.is_secret() && !self.reveal_secrets {
                "*".repeat(value.chars().count().min(24))
            } else {
                value.to_string()
            };
            let focused = field == self.focused_field;
            let marker = if focused { "> " } else { "  " };
            let style = if focused { theme.accent() } else { theme.text() };
            lines.push(Line::from(vec![
                Span::styled(format!("  {marker}{:<15}", field.label()), style),
                Span::styled(shown, style),
                Span::styled(if focused { "_" } else { "" }, style),
            ]));
        }

        lines.push(Line::default());
        if state.is_saving() {
            lines.push(Line::styled("  Saving credentials...", theme.warning()));
        } else {
            lines.push(Line::styled(
                "  Press [Enter] to save, [Ctrl+R] to show secrets.",
                theme.muted(),
            ));
        }
        lines
    }

    fn install_lines(&self) -> Vec<Line<'static>> {
        let theme = theme::current();
        let state = self.wizard.state();
        let provider = state.provider().display_name();
        let mut lines = vec![
            Line::default(),
            Line::styled(
                format!("  Credentials saved. Install the app to your {provider} workspace."),
                theme.text(),
            ),
            Line::default(),
        ];
        if state.is_authorizing() {
            lines.push(Line::styled(
                "  Waiting for authorization in your browser...",
                theme.warning(),
            ));
            match self.return_url {
                Some(ref url) => lines.push(Line::styled(
                    format!("  Reporting back to {url}"),
                    theme.muted(),
                )),
                None => lines.push(Line::styled(
                    "  No callback relay is running. Press [x] once the browser says you are done.",
                    theme.muted(),
                )),
            }
            lines.push(Line::styled(
                "  [x] I closed the window   [Enter] start over   [Esc] cancel",
                theme.muted(),
            ));
        } else {
            lines.push(Line::styled(
                format!("  Press [Enter] to add the app to {provider}."),
                theme.text(),
            ));
        }
        lines
    }

    fn connected_lines(&self) -> Vec<Line<'static>> {
        let theme = theme::current();
        let state = self.wizard.state();
        let workspace = state
            .workspace_name()
            .map(String::from)
            .unwrap_or_else(|| format!("your {} workspace", state.provider().display_name()));
        let mut lines = vec![
            Line::default(),
            Line::styled(format!("  Connected to {workspace}."), theme.success()),
            Line::default(),
        ];
        if state.is_disconnecting() {
            lines.push(Line::styled("  Disconnecting...", theme.warning()));
        } else {
            lines.push(Line::styled(
                "  [Enter] done   [d] disconnect",
                theme.muted(),
            ));
        }
        lines
    }

    fn render_banner(&self, frame: &mut Frame, area: Rect) {
        let theme = theme::current();
        let line = if let Some(error) = self.wizard.state().error() {
            Line::styled(format!("  {error}"), theme.error())
        } else if let Some(ref error) = self.last_error {
            Line::styled(format!("  {error}"), theme.warning())
        } else if let Some(toast) = self.current_toast() {
            Line::styled(format!("  {}", toast.message), toast_style(toast.level))
        } else {
            Line::default()
        };
        frame.render_widget(Paragraph::new(line).wrap(Wrap { trim: true }), area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let theme = theme::current();
        let mut lines = vec![Line::styled(
            "  [Ctrl+B] back   [Esc] close   [F1] help",
            theme.muted(),
        )];
        if let Some(last) = self.event_log.front() {
            lines.push(Line::styled(
                format!("  last event: {}", last.describe()),
                theme.muted(),
            ));
        }
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_confirm_disconnect(&self, frame: &mut Frame, area: Rect) {
        let theme = theme::current();
        let popup = crate::ui::layout::centered_rect(52, 7, area);
        let text = format!(
            "\n  Disconnect {}? The bot stops answering there.\n\n  [y] disconnect   [n] keep",
            self.wizard
                .state()
                .workspace_name()
                .unwrap_or("this workspace")
        );
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(text).style(theme.text()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.error())
                    .title(" Confirm "),
            ),
            popup,
        );
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let popup = crate::ui::layout::centered_rect(60, 30, area);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(self.keybinds.help_text())
                .style(theme::current().text())
                .block(Block::default().borders(Borders::ALL).title(" Help ")),
            popup,
        );
    }
}

fn toast_style(level: NotificationLevel) -> Style {
    let theme = theme::current();
    match level {
        NotificationLevel::Info => theme.text(),
        NotificationLevel::Success => theme.success(),
        NotificationLevel::Warning => theme.warning(),
        NotificationLevel::Error => theme.error(),
    }
}

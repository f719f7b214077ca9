pub struct Keybinds;

impl Default for Keybinds {
    fn default() -> Self {
        Self
    }
}

impl Keybinds {
    pub fn help_text(&self) -> String {
        r#"Keyboard Shortcuts:

Every step:
  Enter         Primary action for the step
  Ctrl + B      Back to the previous step
  Esc           Cancel a pending authorization, otherwise close
  F1 / ?        Toggle this help (? only outside text fields)
  Ctrl + Q      Quit

Create app:
  o             Open the provider's app console

Credentials:
  Tab / ↓       Next field
  Shift+Tab / ↑ Previous field
  Ctrl + R      Show or hide secrets

Install:
  x             I closed the authorization window

Connected:
  d             Disconnect (asks for confirmation)
  y / n         Confirm or cancel disconnect
"#
        .to_string()
    }
}

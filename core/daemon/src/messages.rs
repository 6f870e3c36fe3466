//! Operator-facing message rendering.
//!
//! Templates come from the config file with built-in fallbacks; every
//! rendered message carries the configured prefix.

use crate::config::MessagesConfig;

pub struct MessageCatalog {
    prefix: String,
    denied: String,
    denied_notify: String,
}

impl MessageCatalog {
    pub fn new(config: &MessagesConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            denied: config.denied.clone(),
            denied_notify: config.denied_notify.clone(),
        }
    }

    /// Text attached to a refused connection.
    pub fn denied(&self) -> String {
        self.render(&self.denied, &[])
    }

    /// Broadcast line naming the denied player.
    pub fn denied_notify(&self, display_name: &str) -> String {
        self.render(&self.denied_notify, &[display_name])
    }

    fn render(&self, template: &str, arguments: &[&str]) -> String {
        let mut message = String::new();
        if !self.prefix.is_empty() {
            message.push_str(&self.prefix);
            message.push(' ');
        }
        message.push_str(template);
        for argument in arguments {
            message.push(' ');
            message.push_str(argument);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_prefix() {
        let catalog = MessageCatalog::new(&MessagesConfig::default());
        assert_eq!(catalog.denied(), "You are not on the allow-list of this proxy.");
        assert_eq!(
            catalog.denied_notify("Alice"),
            "Denied connection attempt by Alice"
        );
    }

    #[test]
    fn prefix_applies_to_every_message() {
        let config = MessagesConfig {
            prefix: "[proxy]".to_string(),
            denied: "No entry.".to_string(),
            denied_notify: "Blocked".to_string(),
        };
        let catalog = MessageCatalog::new(&config);
        assert_eq!(catalog.denied(), "[proxy] No entry.");
        assert_eq!(catalog.denied_notify("Bob"), "[proxy] Blocked Bob");
    }
}

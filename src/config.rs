/// Session-level configuration.
///
/// Held by value on the session and threaded to collaborators at call
/// time. There is no global mutable config: on reload the invalidator
/// installs a fresh value under the execution lock, so an in-flight
/// statement never observes a half-applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// When enabled, statements accumulate across lines until the
    /// terminator is entered.
    pub multiline: bool,
    /// Offer completions while typing.
    pub autocomplete: bool,
    /// Report elapsed wall time after a statement.
    pub timing: bool,
    /// Channel name for out-of-band schema change notifications.
    pub notification_channel: String,
    /// Location passed to the config loader on reload.
    pub config_path: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            multiline: false,
            autocomplete: true,
            timing: false,
            notification_channel: "schema_updates".to_string(),
            config_path: String::new(),
        }
    }
}

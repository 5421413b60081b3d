//! Shared state passed through the completion pass

/// Context handed to every scope while the configuration is completed.
///
/// Non-fatal diagnostics (derived defaults, ignored settings) go to the
/// caller's `messagefn` and are logged at `info`.
pub struct CompletionContext<'a> {
    messagefn: &'a mut dyn FnMut(&str),
}

impl<'a> CompletionContext<'a> {
    pub fn new(messagefn: &'a mut dyn FnMut(&str)) -> Self {
        Self { messagefn }
    }

    /// Emit a diagnostic message
    pub fn message(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!("{}", message);
        (self.messagefn)(message);
    }
}

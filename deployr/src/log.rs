//! The sink that receives the upgrade transcript.

use crate::core::ScriptState;

/// Receives human readable progress messages from the engine and orchestrator.
pub trait UpgradeLog {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    /// Called every time a script changes state. Does nothing by default.
    fn transition(&self, _script_name: &str, _state: ScriptState) {}
}

/// Forwards every message to [`tracing`]. This is the default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl UpgradeLog for TracingLog {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn transition(&self, script_name: &str, state: ScriptState) {
        tracing::trace!(script = script_name, state = ?state, "Script state changed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every message in memory so tests can inspect the transcript.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingLog {
        pub messages: Mutex<Vec<String>>,
        pub transitions: Mutex<Vec<(String, ScriptState)>>,
    }

    impl RecordingLog {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        pub fn transitions(&self) -> Vec<(String, ScriptState)> {
            self.transitions.lock().unwrap().clone()
        }
    }

    impl UpgradeLog for RecordingLog {
        fn info(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("INFO {message}"));
        }

        fn warn(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("WARN {message}"));
        }

        fn error(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("ERROR {message}"));
        }

        fn transition(&self, script_name: &str, state: ScriptState) {
            self.transitions
                .lock()
                .unwrap()
                .push((script_name.to_string(), state));
        }
    }
}

//! User interface module - interaction (prompts, messages) and formatting.
//!
//! Separates concerns:
//! - `formatter` - Pure formatting functions for the command line
//! - This module - Messages drivers send to the user and input they ask for
//!
//! A host application replaces the console implementation by registering
//! its own [`UserInterface`].

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, OnceLock, RwLock};

use console::{style, Term};
use tracing::info;

use crate::error::Result;
use crate::folders;
use crate::logging;

pub mod formatter;

// Re-export formatter functions for convenience
pub use formatter::{
    display_error, display_measurement, display_merge_report, display_resources, display_status,
    display_success, display_warning,
};

/// Where driver messages and questions go.
pub trait UserInterface: Send + Sync {
    /// Asks the user for a line of input.
    fn get_input(&self, message: &str) -> Result<String>;

    /// Records a message in the logbook.
    fn message_log(&self, message: &str);

    /// Shows a message in the info area.
    fn message_info(&self, message: &str);

    /// Shows a message box. A blocking box waits for the user.
    fn message_box(&self, message: &str, blocking: bool);

    /// Shows a short-lived notification.
    fn message_balloon(&self, message: &str);
}

/// Terminal implementation.
///
/// Log messages are appended to the LOGBOOK file when the folder manager
/// knows one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUi;

impl UserInterface for ConsoleUi {
    fn get_input(&self, message: &str) -> Result<String> {
        let term = Term::stdout();
        term.write_str(message)?;
        Ok(term.read_line()?)
    }

    fn message_log(&self, message: &str) {
        info!(target: "sweepme::logbook", "{}", message);

        let Some(path) = folders::FolderManager::has_instance()
            .then(|| folders::get_file("LOGBOOK"))
            .flatten()
        else {
            return;
        };
        let line = format!("{} - {}\n", logging::timestamp(), message);
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = appended {
            logging::error(&format!("Unable to write logbook {}", path.display()), &e);
        }
    }

    fn message_info(&self, message: &str) {
        println!("{} {}", style("Info:").cyan().bold(), message);
    }

    fn message_box(&self, message: &str, blocking: bool) {
        let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let border = "-".repeat(width + 4);
        println!("{}", border);
        for line in message.lines() {
            println!("| {:<width$} |", line, width = width);
        }
        println!("{}", border);
        if blocking {
            let _ = self.get_input("Press Enter to continue...");
        }
    }

    fn message_balloon(&self, message: &str) {
        println!("{} {}", style("»").yellow(), message);
    }
}

fn slot() -> &'static RwLock<Arc<dyn UserInterface>> {
    static UI: OnceLock<RwLock<Arc<dyn UserInterface>>> = OnceLock::new();
    UI.get_or_init(|| RwLock::new(Arc::new(ConsoleUi)))
}

/// Routes driver messages to `ui`.
pub fn set_user_interface(ui: Arc<dyn UserInterface>) {
    if let Ok(mut current) = slot().write() {
        *current = ui;
    }
}

/// Goes back to the terminal implementation.
pub fn reset_user_interface() {
    set_user_interface(Arc::new(ConsoleUi));
}

/// The user interface messages currently go to.
pub fn user_interface() -> Arc<dyn UserInterface> {
    slot()
        .read()
        .map(|current| current.clone())
        .unwrap_or_else(|_| Arc::new(ConsoleUi))
}

pub fn get_input(message: &str) -> Result<String> {
    user_interface().get_input(message)
}

pub fn message_log(message: &str) {
    user_interface().message_log(message)
}

pub fn message_info(message: &str) {
    user_interface().message_info(message)
}

pub fn message_box(message: &str, blocking: bool) {
    user_interface().message_box(message, blocking)
}

pub fn message_balloon(message: &str) {
    user_interface().message_balloon(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUi {
        messages: Mutex<Vec<String>>,
    }

    impl UserInterface for RecordingUi {
        fn get_input(&self, message: &str) -> Result<String> {
            self.messages.lock().unwrap().push(format!("input:{}", message));
            Ok("42".to_string())
        }

        fn message_log(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("log:{}", message));
        }

        fn message_info(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("info:{}", message));
        }

        fn message_box(&self, message: &str, blocking: bool) {
            self.messages
                .lock()
                .unwrap()
                .push(format!("box:{}:{}", message, blocking));
        }

        fn message_balloon(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("balloon:{}", message));
        }
    }

    #[test]
    #[serial]
    fn test_registered_interface_receives_messages() {
        let recording = Arc::new(RecordingUi::default());
        set_user_interface(recording.clone());

        message_log("started");
        message_info("ready");
        message_box("check cable", true);
        message_balloon("done");
        assert_eq!(get_input("Value? ").unwrap(), "42");

        reset_user_interface();
        message_info("back on the console");

        assert_eq!(
            *recording.messages.lock().unwrap(),
            vec![
                "log:started",
                "info:ready",
                "box:check cable:true",
                "balloon:done",
                "input:Value? "
            ]
        );
    }

    #[test]
    fn test_console_box_without_blocking() {
        ConsoleUi.message_box("line one\nsecond line", false);
        ConsoleUi.message_balloon("note");
    }
}

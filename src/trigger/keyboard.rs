use crate::control::ControlHandle;
use crate::error::Result;
use crate::pipeline::CaptureSource;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Capture,
    Retake,
    Share,
    SwitchCamera,
    Discover,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char(' ') | KeyCode::Enter => Some(KeyAction::Capture),
            KeyCode::Char('r') => Some(KeyAction::Retake),
            KeyCode::Char('s') => Some(KeyAction::Share),
            KeyCode::Char('c') => Some(KeyAction::SwitchCamera),
            KeyCode::Char('d') => Some(KeyAction::Discover),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }

    fn apply(self, handle: &ControlHandle) -> Result<()> {
        match self {
            KeyAction::Capture => handle.trigger_capture(CaptureSource::Local),
            KeyAction::Retake => handle.retake(),
            KeyAction::Share => handle.share(None),
            KeyAction::SwitchCamera => handle.switch_camera(),
            KeyAction::Discover => handle.start_discovery(),
            KeyAction::Quit => handle.shutdown("User requested via keyboard"),
        }
    }
}

/// Local shortcuts read from the terminal in raw mode
pub struct KeyboardInputHandler {
    handle: ControlHandle,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(handle: ControlHandle) -> Self {
        Self {
            handle,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        info!("Keyboard shortcuts: SPACE capture, r retake, s share, c camera, d discover, q quit");

        let handle = self.handle.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        let Some(action) = KeyAction::from_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        debug!("Key action {:?}", action);
                        if action.apply(&handle).is_err() {
                            warn!("Control loop gone, leaving keyboard handler");
                            break;
                        }
                        if action == KeyAction::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        })
    }

    pub fn stop(&self) {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();
    }
}

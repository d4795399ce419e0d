//! In-process keystrokes through the `enigo` crate.

use super::backend::{BackendError, TypeBackend};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

/// Keystroke backend that injects input directly instead of shelling out.
///
/// The connection to the display is opened on first use so that merely
/// selecting this backend never fails.
pub struct EnigoBackend {
    enigo: Option<Enigo>,
}

impl EnigoBackend {
    pub fn new() -> Self {
        Self { enigo: None }
    }

    fn connection(&mut self) -> Result<&mut Enigo, BackendError> {
        if self.enigo.is_none() {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| BackendError::Input(format!("cannot connect to display: {e}")))?;
            self.enigo = Some(enigo);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| BackendError::Input("no input connection".to_string()))
    }
}

impl Default for EnigoBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// X keysyms for keys enigo has no portable variant for.
mod keysym {
    pub const INSERT: u32 = 0xff63;
    pub const NUM_LOCK: u32 = 0xff7f;
    pub const SCROLL_LOCK: u32 = 0xff14;
    pub const BREAK: u32 = 0xff6b;
    pub const PRINT: u32 = 0xff61;
    pub const HELP: u32 = 0xff6a;
    pub const MENU: u32 = 0xff67;
    pub const KP_MULTIPLY: u32 = 0xffaa;
    pub const KP_ADD: u32 = 0xffab;
    pub const KP_SUBTRACT: u32 = 0xffad;
    pub const KP_DIVIDE: u32 = 0xffaf;
    pub const KP_0: u32 = 0xffb0;
    pub const SUPER_L: u32 = 0xffeb;
    pub const SUPER_R: u32 = 0xffec;
}

fn key(token: &str) -> Option<Key> {
    let key = match token {
        "{TAB}" => Key::Tab,
        "{ENTER}" | "~" => Key::Return,
        "{UP}" => Key::UpArrow,
        "{DOWN}" => Key::DownArrow,
        "{LEFT}" => Key::LeftArrow,
        "{RIGHT}" => Key::RightArrow,
        "{INSERT}" | "{INS}" => Key::Other(keysym::INSERT),
        "{DELETE}" | "{DEL}" => Key::Delete,
        "{HOME}" => Key::Home,
        "{END}" => Key::End,
        "{PGUP}" => Key::PageUp,
        "{PGDN}" => Key::PageDown,
        "{SPACE}" => Key::Space,
        "{BACKSPACE}" | "{BS}" | "{BKSP}" => Key::Backspace,
        "{BREAK}" => Key::Other(keysym::BREAK),
        "{CAPSLOCK}" => Key::CapsLock,
        "{ESC}" => Key::Escape,
        "{WIN}" | "@" => Key::Meta,
        "{LWIN}" => Key::Other(keysym::SUPER_L),
        "{RWIN}" => Key::Other(keysym::SUPER_R),
        "{APPS}" => Key::Other(keysym::MENU),
        "{HELP}" => Key::Other(keysym::HELP),
        "{NUMLOCK}" => Key::Other(keysym::NUM_LOCK),
        "{PRTSC}" => Key::Other(keysym::PRINT),
        "{SCROLLLOCK}" => Key::Other(keysym::SCROLL_LOCK),
        "{F1}" => Key::F1,
        "{F2}" => Key::F2,
        "{F3}" => Key::F3,
        "{F4}" => Key::F4,
        "{F5}" => Key::F5,
        "{F6}" => Key::F6,
        "{F7}" => Key::F7,
        "{F8}" => Key::F8,
        "{F9}" => Key::F9,
        "{F10}" => Key::F10,
        "{F11}" => Key::F11,
        "{F12}" => Key::F12,
        "{F13}" => Key::F13,
        "{F14}" => Key::F14,
        "{F15}" => Key::F15,
        "{F16}" => Key::F16,
        "{ADD}" => Key::Other(keysym::KP_ADD),
        "{SUBTRACT}" => Key::Other(keysym::KP_SUBTRACT),
        "{MULTIPLY}" => Key::Other(keysym::KP_MULTIPLY),
        "{DIVIDE}" => Key::Other(keysym::KP_DIVIDE),
        "+" => Key::Shift,
        "^" => Key::Control,
        "%" => Key::Alt,
        _ => return numpad(token),
    };
    Some(key)
}

/// `{NUMPAD0}` through `{NUMPAD9}`.
fn numpad(token: &str) -> Option<Key> {
    let digit = token.strip_prefix("{NUMPAD")?.strip_suffix('}')?;
    let digit: u32 = match digit.as_bytes() {
        [d @ b'0'..=b'9'] => u32::from(d - b'0'),
        _ => return None,
    };
    Some(Key::Other(keysym::KP_0 + digit))
}

impl TypeBackend for EnigoBackend {
    fn name(&self) -> &'static str {
        "enigo"
    }

    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        self.connection()?
            .text(text)
            .map_err(|e| BackendError::Input(e.to_string()))
    }

    fn tap_key(&mut self, token: &str) -> Result<(), BackendError> {
        let key = key(token).ok_or_else(|| BackendError::Unsupported(token.to_string()))?;
        self.connection()?
            .key(key, Direction::Click)
            .map_err(|e| BackendError::Input(e.to_string()))
    }

    fn is_supported(&self, token: &str) -> bool {
        key(token).is_some()
    }
}

//! Keystrokes through the external `ydotool` program (uinput, works on Wayland).

use super::backend::{run_tool, type_args, BackendError, ToolAction, TypeBackend};

const TOOL: &str = "ydotool";

pub struct YdotoolBackend;

/// Key table for ydotool. It has no mapping for the Windows/Super keys, so
/// `{WIN}`, `{LWIN}`, `{RWIN}` and `@` are unsupported along with `{APPS}`,
/// `{HELP}` and `{PRTSC}`.
fn action(token: &str) -> Option<ToolAction> {
    use ToolAction::{Key, Type};

    let action = match token {
        "{TAB}" => Key("TAB"),
        "{ENTER}" => Key("ENTER"),
        "~" => Key("Return"),
        "{UP}" => Key("UP"),
        "{DOWN}" => Key("DOWN"),
        "{LEFT}" => Key("LEFT"),
        "{RIGHT}" => Key("RIGHT"),
        "{INSERT}" | "{INS}" => Key("INSERT"),
        "{DELETE}" | "{DEL}" => Key("DELETE"),
        "{HOME}" => Key("HOME"),
        "{END}" => Key("END"),
        "{PGUP}" => Key("PAGEUP"),
        "{PGDN}" => Key("PAGEDOWN"),
        "{SPACE}" => Type(" "),
        "{BACKSPACE}" | "{BS}" | "{BKSP}" => Key("BACKSPACE"),
        "{BREAK}" => Key("BREAK"),
        "{CAPSLOCK}" => Key("CAPSLOCK"),
        "{ESC}" => Key("ESC"),
        "{NUMLOCK}" => Key("NUMLOCK"),
        "{SCROLLLOCK}" => Key("SCROLLLOCK"),
        "{F1}" => Key("F1"),
        "{F2}" => Key("F2"),
        "{F3}" => Key("F3"),
        "{F4}" => Key("F4"),
        "{F5}" => Key("F5"),
        "{F6}" => Key("F6"),
        "{F7}" => Key("F7"),
        "{F8}" => Key("F8"),
        "{F9}" => Key("F9"),
        "{F10}" => Key("F10"),
        "{F11}" => Key("F11"),
        "{F12}" => Key("F12"),
        "{F13}" => Key("F13"),
        "{F14}" => Key("F14"),
        "{F15}" => Key("F15"),
        "{F16}" => Key("F16"),
        "{ADD}" => Key("KPPLUS"),
        "{SUBTRACT}" => Key("KPMINUS"),
        "{MULTIPLY}" => Key("KPASTERISK"),
        "{DIVIDE}" => Key("KPSLASH"),
        "{NUMPAD0}" => Key("KP0"),
        "{NUMPAD1}" => Key("KP1"),
        "{NUMPAD2}" => Key("KP2"),
        "{NUMPAD3}" => Key("KP3"),
        "{NUMPAD4}" => Key("KP4"),
        "{NUMPAD5}" => Key("KP5"),
        "{NUMPAD6}" => Key("KP6"),
        "{NUMPAD7}" => Key("KP7"),
        "{NUMPAD8}" => Key("KP8"),
        "{NUMPAD9}" => Key("KP9"),
        "+" => Key("LEFTSHIFT"),
        "^" => Key("LEFTCTRL"),
        "%" => Key("LEFTALT"),
        _ => return None,
    };
    Some(action)
}

impl TypeBackend for YdotoolBackend {
    fn name(&self) -> &'static str {
        TOOL
    }

    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        run_tool(TOOL, &type_args(text))
    }

    fn tap_key(&mut self, token: &str) -> Result<(), BackendError> {
        let action = action(token).ok_or_else(|| BackendError::Unsupported(token.to_string()))?;
        run_tool(TOOL, &action.args())
    }

    fn is_supported(&self, token: &str) -> bool {
        action(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ydotool_table_differs_from_xdotool() {
        let backend = YdotoolBackend;
        assert_eq!(action("{ENTER}"), Some(ToolAction::Key("ENTER")));
        assert_eq!(action("{PGDN}"), Some(ToolAction::Key("PAGEDOWN")));
        assert!(backend.is_supported("%"));
        assert!(!backend.is_supported("@"));
        assert!(!backend.is_supported("{WIN}"));
        assert!(!backend.is_supported("{LWIN}"));
    }
}

//! Keystrokes through the external `xdotool` program (X11).

use super::backend::{run_tool, type_args, BackendError, ToolAction, TypeBackend};

const TOOL: &str = "xdotool";

pub struct XdotoolBackend;

/// Key table for xdotool. `{APPS}`, `{HELP}` and `{PRTSC}` have no mapping.
fn action(token: &str) -> Option<ToolAction> {
    use ToolAction::{Key, Type};

    let action = match token {
        "{TAB}" => Key("Tab"),
        "{ENTER}" | "~" => Key("Return"),
        "{UP}" => Key("Up"),
        "{DOWN}" => Key("Down"),
        "{LEFT}" => Key("Left"),
        "{RIGHT}" => Key("Right"),
        "{INSERT}" | "{INS}" => Key("Insert"),
        "{DELETE}" | "{DEL}" => Key("Delete"),
        "{HOME}" => Key("Home"),
        "{END}" => Key("End"),
        "{PGUP}" => Key("Page_Up"),
        "{PGDN}" => Key("Page_Down"),
        "{SPACE}" => Type(" "),
        "{BACKSPACE}" | "{BS}" | "{BKSP}" => Key("BackSpace"),
        "{BREAK}" => Key("Break"),
        "{CAPSLOCK}" => Key("Caps_Lock"),
        "{ESC}" => Key("Escape"),
        "{WIN}" | "@" => Key("Super"),
        "{LWIN}" => Key("Super_L"),
        "{RWIN}" => Key("Super_R"),
        "{NUMLOCK}" => Key("Num_Lock"),
        "{SCROLLLOCK}" => Key("Scroll_Lock"),
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
        "{ADD}" => Key("KP_Add"),
        "{SUBTRACT}" => Key("KP_Subtract"),
        "{MULTIPLY}" => Key("KP_Multiply"),
        "{DIVIDE}" => Key("KP_Divide"),
        "{NUMPAD0}" => Key("KP_0"),
        "{NUMPAD1}" => Key("KP_1"),
        "{NUMPAD2}" => Key("KP_2"),
        "{NUMPAD3}" => Key("KP_3"),
        "{NUMPAD4}" => Key("KP_4"),
        "{NUMPAD5}" => Key("KP_5"),
        "{NUMPAD6}" => Key("KP_6"),
        "{NUMPAD7}" => Key("KP_7"),
        "{NUMPAD8}" => Key("KP_8"),
        "{NUMPAD9}" => Key("KP_9"),
        "+" => Key("shift"),
        "^" => Key("ctrl"),
        "%" => Key("alt"),
        _ => return None,
    };
    Some(action)
}

impl TypeBackend for XdotoolBackend {
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

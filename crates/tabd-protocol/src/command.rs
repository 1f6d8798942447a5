use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The recognized browser-automation command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Navigate,
    Open,
    Back,
    Forward,
    Reload,
    Close,
    Snapshot,
    Click,
    Dblclick,
    Fill,
    Type,
    Press,
    Hover,
    Focus,
    Check,
    Uncheck,
    Select,
    Scroll,
    Scrollintoview,
    Get,
    Is,
    Find,
    Drag,
    Upload,
    Mouse,
    Wait,
    Tab,
    TabNew,
    TabClose,
    TabSwitch,
    TabList,
    Screenshot,
    Pdf,
    Eval,
}

impl CommandType {
    /// The navigation-class set eligible to auto-launch a browser.
    pub fn is_navigation_class(self) -> bool {
        matches!(self, CommandType::Navigate | CommandType::Open | CommandType::TabNew)
    }

    /// Parses a loosely-typed command type string, accepting the wire `snake_case` spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.to_string())).ok()
    }
}

/// A command submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Command {
    /// Reads a single string parameter out of `params`, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// The wire form of a command forwarded to an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

/// A response from the extension, matched back to its originating command by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtensionResponse {
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Identical wire shape to [`ExtensionResponse`]; the value returned to the originating client.
pub type ClientResponse = ExtensionResponse;

/// Validates a command's structure, independent of session resolution.
///
/// `params`, when present, must already have deserialized as a JSON object — `serde`'s
/// `Map<String, Value>` guarantees that for us, so the only remaining checks are on the
/// string fields the router depends on.
pub fn validate_command(cmd: &Command) -> Result<(), &'static str> {
    if cmd.id.trim().is_empty() {
        return Err("Invalid command structure");
    }
    Ok(())
}

/// Translates a router-level command into the shape sent to the extension.
///
/// `navigate` becomes `open`; the synthetic tab-action types collapse onto a single `tab` command
/// carrying `params.action`; everything else passes through verbatim.
pub fn translate_for_extension(cmd: &Command) -> ExtensionCommand {
    let (wire_type, params) = match cmd.command_type {
        CommandType::Navigate => ("open".to_string(), cmd.params.clone()),
        CommandType::TabNew | CommandType::TabClose | CommandType::TabSwitch | CommandType::TabList => {
            let action = match cmd.command_type {
                CommandType::TabNew => "new",
                CommandType::TabClose => "close",
                CommandType::TabSwitch => "switch",
                CommandType::TabList => "list",
                _ => unreachable!(),
            };
            let mut params = cmd.params.clone().unwrap_or_default();
            params.insert("action".to_string(), Value::String(action.to_string()));
            ("tab".to_string(), Some(params))
        }
        other => (wire_name(other), cmd.params.clone()),
    };

    ExtensionCommand {
        id: cmd.id.clone(),
        command_type: wire_type,
        params,
    }
}

fn wire_name(command_type: CommandType) -> String {
    // `CommandType` already serializes as the snake_case wire spelling; round-trip through
    // `serde_json` rather than hand-maintaining a second name table.
    match serde_json::to_value(command_type) {
        Ok(Value::String(s)) => s,
        _ => unreachable!("CommandType always serializes to a string"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(command_type: CommandType, params: Option<Map<String, Value>>) -> Command {
        Command {
            id: "c1".to_string(),
            session_id: "default".to_string(),
            profile: None,
            command_type,
            params,
            timestamp: None,
        }
    }

    #[test]
    fn navigate_translates_to_open() {
        let mut params = Map::new();
        params.insert("url".to_string(), Value::String("https://example.com".to_string()));
        let ext = translate_for_extension(&cmd(CommandType::Navigate, Some(params)));
        assert_eq!(ext.command_type, "open");
        assert_eq!(ext.params.unwrap().get("url").unwrap(), "https://example.com");
    }

    #[test]
    fn tab_new_maps_to_tab_with_action() {
        let mut params = Map::new();
        params.insert("url".to_string(), Value::String("https://g".to_string()));
        let ext = translate_for_extension(&cmd(CommandType::TabNew, Some(params)));
        assert_eq!(ext.command_type, "tab");
        let params = ext.params.unwrap();
        assert_eq!(params.get("action").unwrap(), "new");
        assert_eq!(params.get("url").unwrap(), "https://g");
    }

    #[test]
    fn other_types_pass_through_verbatim() {
        let ext = translate_for_extension(&cmd(CommandType::Click, None));
        assert_eq!(ext.command_type, "click");
    }

    #[test]
    fn command_type_parses_wire_spelling() {
        assert_eq!(CommandType::parse("tab_new"), Some(CommandType::TabNew));
        assert_eq!(CommandType::parse("scrollintoview"), Some(CommandType::Scrollintoview));
        assert_eq!(CommandType::parse("bogus"), None);
    }

    #[test]
    fn empty_id_fails_validation() {
        let mut c = cmd(CommandType::Click, None);
        c.id = "  ".to_string();
        assert!(validate_command(&c).is_err());
    }

    #[test]
    fn navigation_class_set_is_correct() {
        assert!(CommandType::Navigate.is_navigation_class());
        assert!(CommandType::Open.is_navigation_class());
        assert!(CommandType::TabNew.is_navigation_class());
        assert!(!CommandType::Click.is_navigation_class());
    }
}

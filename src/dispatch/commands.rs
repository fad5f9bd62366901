use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::labels::{GestureId, LabelSet};
use crate::settings::ConfigError;

/// Player command for one gesture: the `command` array of an IPC request
/// plus a short label for the action log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSpec {
    pub command: Vec<Value>,
    pub description: String,
}

impl CommandSpec {
    pub fn new(command: Vec<Value>, description: &str) -> Self {
        Self {
            command,
            description: description.to_string(),
        }
    }

    /// `{"command": [...]}` followed by a newline.
    pub fn to_request_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(&json!({ "command": self.command }))?;
        line.push('\n');
        Ok(line)
    }

    fn is_well_formed(&self) -> bool {
        matches!(self.command.first(), Some(Value::String(verb)) if !verb.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandTable {
    commands: BTreeMap<GestureId, CommandSpec>,
}

impl CommandTable {
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Apply overrides from settings; a `None` value removes the mapping.
    pub fn with_overrides(mut self, overrides: &BTreeMap<GestureId, Option<CommandSpec>>) -> Self {
        for (gesture, spec) in overrides {
            match spec {
                Some(spec) => {
                    self.commands.insert(*gesture, spec.clone());
                }
                None => {
                    self.commands.remove(gesture);
                }
            }
        }
        self
    }

    pub fn insert(&mut self, gesture: GestureId, spec: CommandSpec) {
        self.commands.insert(gesture, spec);
    }

    pub fn get(&self, gesture: GestureId) -> Option<&CommandSpec> {
        self.commands.get(&gesture)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every label the classifier can emit needs a well-formed command.
    pub fn validate(&self, labels: &LabelSet) -> Result<(), ConfigError> {
        for gesture in labels.iter() {
            let spec = self
                .commands
                .get(&gesture)
                .ok_or(ConfigError::MissingCommand(gesture))?;
            if !spec.is_well_formed() {
                return Err(ConfigError::MalformedCommand(gesture));
            }
        }
        Ok(())
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        let commands = BTreeMap::from([
            (GestureId::Play, CommandSpec::new(vec![json!("set_property"), json!("pause"), json!(false)], "Play")),
            (GestureId::Pause, CommandSpec::new(vec![json!("set_property"), json!("pause"), json!(true)], "Pause")),
            (GestureId::VolumeUp, CommandSpec::new(vec![json!("add"), json!("volume"), json!(5)], "Vol+5%")),
            (GestureId::VolumeDown, CommandSpec::new(vec![json!("add"), json!("volume"), json!(-5)], "Vol-5%")),
            (GestureId::Next, CommandSpec::new(vec![json!("playlist-next")], "Next")),
            (GestureId::Previous, CommandSpec::new(vec![json!("playlist-prev")], "Prev")),
            (GestureId::SkipRight, CommandSpec::new(vec![json!("seek"), json!(5)], "+5s")),
            (GestureId::SkipLeft, CommandSpec::new(vec![json!("seek"), json!(-5)], "-5s")),
            (GestureId::Stop, CommandSpec::new(vec![json!("stop")], "Stop")),
        ]);
        Self { commands }
    }
}

/// Query sent once at startup to see whether the player is listening.
pub fn probe_command() -> CommandSpec {
    CommandSpec::new(vec![json!("get_property"), json!("pause")], "Probe")
}

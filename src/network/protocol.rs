//! Protocol Messages
//!
//! Wire format between the simulation and the renderer. Everything is a
//! WebSocket text frame:
//!
//! - inbound ack tokens: a bare or quoted integer or float (`7`, `"7"`, `7.0`)
//! - inbound JSON: `{"type":"control","cmd":..,"value":..}` or
//!   `{"type":"input","direction":..}`
//! - outbound: one [`StateSnapshot`] per tick, [`AckNotice`]s for controls,
//!   and the text `close` on shutdown

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::game::entity::{Direction, Entity, EntityId, EntityKind, EntityState};
use crate::game::state::World;

/// Text sent to the client before the server goes away.
pub const CLOSE_NOTICE: &str = "close";

/// Inbound message errors. Each one discards only the offending message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Blank frame.
    #[error("empty message")]
    Empty,

    /// Neither JSON nor a usable tick number.
    #[error("not a tick token: {0:?}")]
    BadTickToken(String),

    /// JSON that does not match the message schema.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A setter without a value.
    #[error("{0} needs a value")]
    MissingValue(&'static str),

    /// A setter value that is not a number.
    #[error("{cmd}: bad value {value}")]
    BadValue {
        /// Command name
        cmd: &'static str,
        /// Offending value
        value: String,
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// JSON messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session control.
    Control {
        /// Command
        cmd: ControlCmd,
        /// Argument of the setters
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// One hop of the frog.
    Input {
        /// Hop direction
        direction: Direction,
    },
}

/// Control command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCmd {
    /// Open the start gate
    Start,
    /// Hold before the next tick
    Pause,
    /// Continue after a pause
    Resume,
    /// New session after the next start
    Restart,
    /// Timer at spawn
    SetStartTime,
    /// Lives at session start
    SetStartLives,
    /// Level at session start
    SetStartLevel,
}

impl ControlCmd {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlCmd::Start => "start",
            ControlCmd::Pause => "pause",
            ControlCmd::Resume => "resume",
            ControlCmd::Restart => "restart",
            ControlCmd::SetStartTime => "set_start_time",
            ControlCmd::SetStartLives => "set_start_lives",
            ControlCmd::SetStartLevel => "set_start_level",
        }
    }
}

/// A validated control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Open the start gate
    Start,
    /// Hold before the next tick
    Pause,
    /// Continue after a pause
    Resume,
    /// New session after the next start
    Restart,
    /// Timer at spawn (unclamped)
    SetStartTime(i64),
    /// Lives at session start (unclamped)
    SetStartLives(i64),
    /// Level at session start (unclamped)
    SetStartLevel(i64),
}

impl ControlCommand {
    fn from_wire(cmd: ControlCmd, value: Option<Value>) -> Result<Self, ProtocolError> {
        let number = || -> Result<i64, ProtocolError> {
            let value = value.as_ref().ok_or(ProtocolError::MissingValue(cmd.as_str()))?;
            parse_number(value).ok_or_else(|| ProtocolError::BadValue {
                cmd: cmd.as_str(),
                value: value.to_string(),
            })
        };

        Ok(match cmd {
            ControlCmd::Start => ControlCommand::Start,
            ControlCmd::Pause => ControlCommand::Pause,
            ControlCmd::Resume => ControlCommand::Resume,
            ControlCmd::Restart => ControlCommand::Restart,
            ControlCmd::SetStartTime => ControlCommand::SetStartTime(number()?),
            ControlCmd::SetStartLives => ControlCommand::SetStartLives(number()?),
            ControlCmd::SetStartLevel => ControlCommand::SetStartLevel(number()?),
        })
    }
}

/// A parsed inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Tick acknowledgement
    Ack(u64),
    /// Session control
    Control(ControlCommand),
    /// Frog hop
    Input(Direction),
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    if text.starts_with('{') {
        return match serde_json::from_str::<ClientMessage>(text)? {
            ClientMessage::Control { cmd, value } => {
                Ok(Inbound::Control(ControlCommand::from_wire(cmd, value)?))
            }
            ClientMessage::Input { direction } => Ok(Inbound::Input(direction)),
        };
    }

    parse_tick_token(text)
        .map(Inbound::Ack)
        .ok_or_else(|| ProtocolError::BadTickToken(text.to_string()))
}

/// `7`, `"7"`, `7.0` and `"7.9"` all read as tick 7.
fn parse_tick_token(text: &str) -> Option<u64> {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim();

    if let Ok(tick) = inner.parse::<u64>() {
        return Some(tick);
    }
    let value = inner.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value <= u64::MAX as f64).then(|| value.trunc() as u64)
}

fn parse_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// One rendered entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    /// Stable id
    pub id: EntityId,
    /// Kind name
    pub breed: String,
    /// Column
    pub x: i32,
    /// Row (bottom-up)
    pub y: i32,
    /// Degrees: right = 90, left = -90, frog = 0
    pub heading: i32,
    /// Turtles: under water
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Pads: filled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupied: Option<bool>,
    /// Frog: hops since spawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jumps: Option<u32>,
}

impl AgentView {
    fn from_entity(entity: &Entity) -> Self {
        let (hidden, occupied) = match entity.state {
            EntityState::Turtle { submerged, .. } => (Some(submerged), None),
            EntityState::Pad { occupied, .. } => (None, Some(occupied)),
            EntityState::Plain => (None, None),
        };
        Self {
            id: entity.id,
            breed: entity.kind.breed().to_string(),
            x: entity.position.x,
            y: entity.position.y,
            heading: entity.heading.degrees(),
            hidden,
            occupied,
            jumps: None,
        }
    }
}

/// Full state for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Token the client must send back to release the next tick
    pub expecting_tick: u64,
    /// Simulation tick
    pub tick: u64,
    /// Lives left
    pub lives: u32,
    /// Timer units left
    pub time_left: u32,
    /// No lives left
    pub game_over: bool,
    /// All pads filled
    pub game_won: bool,
    /// Applied level (1-based)
    pub level: usize,
    /// Ids the client should discard
    pub remove_ids: Vec<EntityId>,
    /// Frog first (if active), then the entity table in id order
    pub agents: Vec<AgentView>,
}

impl StateSnapshot {
    /// Capture the world.
    pub fn capture(world: &World, expecting_tick: u64, remove_ids: Vec<EntityId>) -> Self {
        let mut agents = Vec::with_capacity(world.registry.entities().count() + 1);
        if let Some(frog) = world.registry.frog() {
            agents.push(AgentView {
                id: frog.id,
                breed: EntityKind::Frog.breed().to_string(),
                x: frog.position.x,
                y: frog.position.y,
                heading: 0,
                hidden: None,
                occupied: None,
                jumps: Some(frog.jumps),
            });
        }
        agents.extend(world.registry.entities().map(AgentView::from_entity));

        Self {
            expecting_tick,
            tick: world.tick,
            lives: world.state.lives,
            time_left: world.state.time_left,
            game_over: world.state.game_over,
            game_won: world.state.game_won,
            level: world.state.current_level,
            remove_ids,
            agents,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Reply to a control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckNotice {
    /// `started`, `paused`, `resumed`, `restarted` or the setter name
    pub ack: String,
    /// Stored (clamped) value for setters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

impl AckNotice {
    /// Notice for a command, with the stored value for setters.
    pub fn for_command(command: ControlCommand, value: Option<u32>) -> Self {
        let ack = match command {
            ControlCommand::Start => "started",
            ControlCommand::Pause => "paused",
            ControlCommand::Resume => "resumed",
            ControlCommand::Restart => "restarted",
            ControlCommand::SetStartTime(_) => ControlCmd::SetStartTime.as_str(),
            ControlCommand::SetStartLives(_) => ControlCmd::SetStartLives.as_str(),
            ControlCommand::SetStartLevel(_) => ControlCmd::SetStartLevel.as_str(),
        };
        Self { ack: ack.to_string(), value }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

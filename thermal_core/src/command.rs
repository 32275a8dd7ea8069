//! Commands submitted from other threads and applied between ticks.
//!
//! The queue is bounded; a full queue is reported to the sender instead of
//! blocking it. The runner drains the queue before each tick so every zone
//! field has a single writer.
use crossbeam_channel as xch;

use crate::autotune::AutotuneObserver;
use crate::error::ThermalError;
use crate::zone::ZoneId;

pub enum ControlCommand {
    SetTarget { zone: ZoneId, celsius: f32 },
    SetTargetOffset { zone: ZoneId, delta: f32 },
    SetStandby { zone: ZoneId, on: bool },
    SetMaxTemp { zone: ZoneId, celsius: f32 },
    /// Per-second gains.
    SetGains { zone: ZoneId, kp: f32, ki: f32, kd: f32 },
    NotifyActivity { zone: ZoneId },
    NotifyExtrusion { zone: ZoneId, mm: f32 },
    Disable { zone: ZoneId },
    DisableAll,
    Reset { zone: ZoneId },
    StartAutotune {
        zone: ZoneId,
        target_c: f32,
        cycles: u32,
        observer: Box<dyn AutotuneObserver + Send>,
    },
}

impl ControlCommand {
    /// Zone the command addresses, if any.
    pub fn zone(&self) -> Option<ZoneId> {
        match self {
            ControlCommand::SetTarget { zone, .. }
            | ControlCommand::SetTargetOffset { zone, .. }
            | ControlCommand::SetStandby { zone, .. }
            | ControlCommand::SetMaxTemp { zone, .. }
            | ControlCommand::SetGains { zone, .. }
            | ControlCommand::NotifyActivity { zone }
            | ControlCommand::NotifyExtrusion { zone, .. }
            | ControlCommand::Disable { zone }
            | ControlCommand::Reset { zone }
            | ControlCommand::StartAutotune { zone, .. } => Some(*zone),
            ControlCommand::DisableAll => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ControlCommand::SetTarget { .. } => "set_target",
            ControlCommand::SetTargetOffset { .. } => "set_target_offset",
            ControlCommand::SetStandby { .. } => "set_standby",
            ControlCommand::SetMaxTemp { .. } => "set_max_temp",
            ControlCommand::SetGains { .. } => "set_gains",
            ControlCommand::NotifyActivity { .. } => "notify_activity",
            ControlCommand::NotifyExtrusion { .. } => "notify_extrusion",
            ControlCommand::Disable { .. } => "disable",
            ControlCommand::DisableAll => "disable_all",
            ControlCommand::Reset { .. } => "reset",
            ControlCommand::StartAutotune { .. } => "start_autotune",
        }
    }
}

impl std::fmt::Debug for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCommand")
            .field("kind", &self.name())
            .field("zone", &self.zone())
            .finish()
    }
}

/// Cloneable handle for submitting commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: xch::Sender<ControlCommand>,
}

impl CommandSender {
    pub fn send(&self, cmd: ControlCommand) -> Result<(), ThermalError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            xch::TrySendError::Full(_) => ThermalError::State("command queue full".into()),
            xch::TrySendError::Disconnected(_) => {
                ThermalError::State("controller no longer accepting commands".into())
            }
        })
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    rx: xch::Receiver<ControlCommand>,
}

impl CommandReceiver {
    /// Take everything queued right now without blocking.
    pub fn drain(&self) -> impl Iterator<Item = ControlCommand> + '_ {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Bounded command queue between collaborators and the control loop.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = xch::bounded(capacity.max(1));
    (CommandSender { tx }, CommandReceiver { rx })
}

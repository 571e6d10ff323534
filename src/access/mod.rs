//! Access controller.
//!
//! A three-state machine driven by one `FrameVerdict` per processed frame:
//!
//! ```text
//! Uninitialized --complete--> Permitted <--complete-- Denied
//! Uninitialized --incomplete--> Denied  --incomplete--> (stays)
//! ```
//!
//! Hardware is only commanded when the state changes. If the hardware failed
//! to initialize, the controller runs simulated: it computes the same
//! transitions and commands but discards them.

pub mod hardware;

use serde::Serialize;

use crate::error::AccessError;
use crate::processor::FrameVerdict;

pub use hardware::{
    init_hardware, self_test, AccessHardware, ActuatorCommand, ConsoleHardware, HardwareBackend,
    HardwareProfile, RecordingHardware, SelfTestStep,
};

pub const PERMITTED_LINE1: &str = "ACCESS GRANTED";
pub const PERMITTED_LINE2: &str = "PPE complete";
pub const DENIED_LINE1: &str = "ACCESS DENIED";
/// Longest class name shown on the denied line.
const MISSING_NAME_CHARS: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Uninitialized,
    Permitted,
    Denied,
}

/// A state change and the commands it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: AccessState,
    pub to: AccessState,
    pub commands: Vec<ActuatorCommand>,
    /// False when simulated, or when any command failed.
    pub delivered: bool,
}

pub struct AccessController {
    hardware: Option<Box<dyn AccessHardware>>,
    state: AccessState,
    display_columns: usize,
    transitions: u64,
    command_failures: u64,
}

impl AccessController {
    /// Build a controller from the one-time hardware initialization outcome.
    pub fn new(
        hardware: Result<Box<dyn AccessHardware>, AccessError>,
        display_columns: usize,
    ) -> Self {
        let hardware = match hardware {
            Ok(hw) => {
                log::info!("access hardware '{}' ready", hw.name());
                Some(hw)
            }
            Err(err) => {
                log::warn!("{}; running with simulated actuation", err);
                None
            }
        };
        Self {
            hardware,
            state: AccessState::Uninitialized,
            display_columns: display_columns.max(1),
            transitions: 0,
            command_failures: 0,
        }
    }

    pub fn simulated(display_columns: usize) -> Self {
        Self::new(
            Err(AccessError::ActuatorUnavailable("simulated run".to_string())),
            display_columns,
        )
    }

    pub fn is_simulated(&self) -> bool {
        self.hardware.is_none()
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn command_failures(&self) -> u64 {
        self.command_failures
    }

    /// Feed one verdict. Returns the transition when the state changed.
    pub fn observe(&mut self, verdict: &FrameVerdict) -> Option<Transition> {
        let target = if verdict.complete {
            AccessState::Permitted
        } else {
            AccessState::Denied
        };
        if target == self.state {
            return None;
        }

        let commands = entry_commands(target, verdict, self.display_columns);
        let delivered = self.dispatch(&commands);
        let from = self.state;
        self.state = target;
        self.transitions += 1;
        log::info!("access {:?} -> {:?}", from, target);

        Some(Transition {
            from,
            to: target,
            commands,
            delivered,
        })
    }

    /// Show an informational message without touching the access state.
    pub fn announce(&mut self, line1: &str, line2: &str) -> bool {
        let command = ActuatorCommand::ShowStatus {
            line1: fit(line1, self.display_columns),
            line2: fit(line2, self.display_columns),
        };
        self.dispatch(std::slice::from_ref(&command))
    }

    /// Release the hardware. Consumes the controller so no command can
    /// follow a shutdown.
    pub fn shutdown(mut self) -> AccessState {
        if let Some(hw) = self.hardware.as_mut() {
            hw.shutdown();
        }
        self.state
    }

    fn dispatch(&mut self, commands: &[ActuatorCommand]) -> bool {
        let Some(hw) = self.hardware.as_mut() else {
            return false;
        };
        let mut delivered = true;
        for command in commands {
            let result = match command {
                ActuatorCommand::SetDoor { open } => hw.set_door(*open),
                ActuatorCommand::SetPins { granted } => hw.set_pins(*granted),
                ActuatorCommand::ShowStatus { line1, line2 } => hw.show_status(line1, line2),
                ActuatorCommand::Shutdown => {
                    hw.shutdown();
                    Ok(())
                }
            };
            if let Err(err) = result {
                self.command_failures += 1;
                delivered = false;
                log::warn!("{}", err);
            }
        }
        delivered
    }
}

/// Commands issued on entry to `state`: signal pins, display, then door.
pub fn entry_commands(
    state: AccessState,
    verdict: &FrameVerdict,
    display_columns: usize,
) -> Vec<ActuatorCommand> {
    match state {
        AccessState::Permitted => vec![
            ActuatorCommand::SetPins { granted: true },
            ActuatorCommand::ShowStatus {
                line1: fit(PERMITTED_LINE1, display_columns),
                line2: fit(PERMITTED_LINE2, display_columns),
            },
            ActuatorCommand::SetDoor { open: true },
        ],
        AccessState::Denied => {
            let missing = verdict
                .missing
                .first()
                .map(|class| fit(class.as_str(), MISSING_NAME_CHARS))
                .unwrap_or_else(|| "PPE".to_string());
            vec![
                ActuatorCommand::SetPins { granted: false },
                ActuatorCommand::ShowStatus {
                    line1: fit(DENIED_LINE1, display_columns),
                    line2: fit(&format!("Missing {}", missing), display_columns),
                },
                ActuatorCommand::SetDoor { open: false },
            ]
        }
        AccessState::Uninitialized => Vec::new(),
    }
}

/// Truncate to at most `columns` characters.
fn fit(text: &str, columns: usize) -> String {
    text.chars().take(columns).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::ClassRegistry;
    use crate::selector::TargetSet;

    fn verdict(complete: bool) -> FrameVerdict {
        let registry = ClassRegistry::ppe_default();
        let vest = registry.resolve("Safety Vest").unwrap().clone();
        FrameVerdict {
            detected: Vec::new(),
            missing: if complete { Vec::new() } else { vec![vest] },
            complete,
        }
    }

    fn recording() -> (AccessController, RecordingHardware) {
        let probe = RecordingHardware::new();
        let controller = AccessController::new(Ok(Box::new(probe.clone())), 16);
        (controller, probe)
    }

    #[test]
    fn entry_commands_only_on_change() {
        let (mut controller, probe) = recording();
        let sequence = [true, true, false, false, true];
        let transitions: Vec<_> = sequence
            .iter()
            .filter_map(|c| controller.observe(&verdict(*c)))
            .collect();

        assert_eq!(transitions.len(), 3);
        assert_eq!(transitions[0].from, AccessState::Uninitialized);
        assert_eq!(transitions[0].to, AccessState::Permitted);
        assert_eq!(transitions[1].to, AccessState::Denied);
        assert_eq!(transitions[2].to, AccessState::Permitted);
        assert_eq!(probe.door_moves(true), 2);
        assert_eq!(probe.door_moves(false), 1);
        assert_eq!(probe.commands().len(), 9);
        assert_eq!(controller.state(), AccessState::Permitted);
    }

    #[test]
    fn denied_message_names_missing_class() {
        let commands = entry_commands(AccessState::Denied, &verdict(false), 16);
        assert_eq!(
            commands[1],
            ActuatorCommand::ShowStatus {
                line1: "ACCESS DENIED".to_string(),
                line2: "Missing Safety Vest".chars().take(16).collect(),
            }
        );
        assert_eq!(commands[2], ActuatorCommand::SetDoor { open: false });
    }

    #[test]
    fn long_class_names_are_cut_to_twelve() {
        let registry = ClassRegistry::new(&["Reflective Safety Harness"], &["NO-Harness"], &["Person"])
            .unwrap();
        let targets = TargetSet::resolve(&registry, &["Reflective Safety Harness"]).unwrap();
        let verdict = FrameVerdict::evaluate(&targets, &registry, &[]);
        let commands = entry_commands(AccessState::Denied, &verdict, 40);
        assert_eq!(
            commands[1],
            ActuatorCommand::ShowStatus {
                line1: "ACCESS DENIED".to_string(),
                line2: "Missing Reflective S".to_string(),
            }
        );
    }

    #[test]
    fn simulated_controller_tracks_state_without_delivery() {
        let mut controller = AccessController::simulated(16);
        assert!(controller.is_simulated());
        let t = controller.observe(&verdict(false)).unwrap();
        assert_eq!(t.to, AccessState::Denied);
        assert!(!t.delivered);
        assert_eq!(t.commands.len(), 3);
        assert!(controller.observe(&verdict(false)).is_none());
        assert!(!controller.announce("PPE gate", "Stopped"));
    }

    #[test]
    fn failed_commands_are_counted_not_retried() {
        let (mut controller, probe) = recording();
        probe.fail_on("set_door");
        let t = controller.observe(&verdict(true)).unwrap();
        assert!(!t.delivered);
        assert_eq!(controller.command_failures(), 1);
        assert_eq!(controller.state(), AccessState::Permitted);
        // Same state again: nothing is re-sent.
        assert!(controller.observe(&verdict(true)).is_none());
        assert_eq!(probe.commands().len(), 3);
    }

    #[test]
    fn shutdown_releases_hardware() {
        let (mut controller, probe) = recording();
        controller.observe(&verdict(true));
        assert_eq!(controller.shutdown(), AccessState::Permitted);
        assert_eq!(probe.commands().last(), Some(&ActuatorCommand::Shutdown));
    }
}

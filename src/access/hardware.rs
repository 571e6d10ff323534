//! Actuator, signal-pin and display collaborators.
//!
//! `AccessHardware` is the only way the engine touches the door servo, the
//! two signal-pin banks and the character display. Initialization happens
//! once per run through `init_hardware`; a failure there puts the
//! controller into simulated mode for the whole run.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AccessError;

pub const DEFAULT_GRANTED_PINS: [u8; 4] = [17, 18, 27, 22];
pub const DEFAULT_DENIED_PINS: [u8; 4] = [23, 24, 25, 5];
pub const DEFAULT_SERVO_PIN: u8 = 33;
pub const DEFAULT_SETTLE_MS: u64 = 1000;
pub const DEFAULT_DISPLAY_COLUMNS: usize = 16;
pub const DEFAULT_LCD_ADDRESS: u8 = 0x27;

/// Servo duty cycle (percent) for the open position (~90 degrees).
pub const SERVO_OPEN_DUTY: f32 = 7.5;
/// Servo duty cycle (percent) for the closed position (~0 degrees).
pub const SERVO_CLOSED_DUTY: f32 = 2.5;

/// One command sent to the hardware collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ActuatorCommand {
    SetDoor { open: bool },
    SetPins { granted: bool },
    ShowStatus { line1: String, line2: String },
    Shutdown,
}

impl ActuatorCommand {
    pub fn label(&self) -> &'static str {
        match self {
            ActuatorCommand::SetDoor { .. } => "set_door",
            ActuatorCommand::SetPins { .. } => "set_pins",
            ActuatorCommand::ShowStatus { .. } => "show_status",
            ActuatorCommand::Shutdown => "shutdown",
        }
    }
}

/// Door, pin and display interface.
///
/// Every call reports success or failure explicitly. `set_door` blocks for
/// the servo settle time before returning.
pub trait AccessHardware: Send {
    fn name(&self) -> &'static str;

    fn set_door(&mut self, open: bool) -> Result<(), AccessError>;

    /// Drive the granted bank high (or low) and the denied bank to the complement.
    fn set_pins(&mut self, granted: bool) -> Result<(), AccessError>;

    fn show_status(&mut self, line1: &str, line2: &str) -> Result<(), AccessError>;

    /// Drive every pin low and release the devices.
    fn shutdown(&mut self);
}

/// Physical layout of the gate hardware.
#[derive(Clone, Debug, PartialEq)]
pub struct HardwareProfile {
    pub granted_pins: Vec<u8>,
    pub denied_pins: Vec<u8>,
    pub servo_pin: u8,
    pub settle: Duration,
    pub display_columns: usize,
    pub lcd_address: u8,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            granted_pins: DEFAULT_GRANTED_PINS.to_vec(),
            denied_pins: DEFAULT_DENIED_PINS.to_vec(),
            servo_pin: DEFAULT_SERVO_PIN,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            display_columns: DEFAULT_DISPLAY_COLUMNS,
            lcd_address: DEFAULT_LCD_ADDRESS,
        }
    }
}

impl HardwareProfile {
    pub fn validate(&self) -> Result<(), AccessError> {
        if self.granted_pins.is_empty() || self.denied_pins.is_empty() {
            return Err(AccessError::ActuatorUnavailable(
                "both signal pin banks need at least one pin".to_string(),
            ));
        }
        if let Some(pin) = self
            .granted_pins
            .iter()
            .find(|pin| self.denied_pins.contains(*pin))
        {
            return Err(AccessError::ActuatorUnavailable(format!(
                "pin {} is in both signal banks",
                pin
            )));
        }
        if self.granted_pins.contains(&self.servo_pin) || self.denied_pins.contains(&self.servo_pin)
        {
            return Err(AccessError::ActuatorUnavailable(format!(
                "servo pin {} overlaps a signal bank",
                self.servo_pin
            )));
        }
        if self.display_columns == 0 {
            return Err(AccessError::ActuatorUnavailable(
                "display needs at least one column".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    /// No hardware; the run is simulated.
    None,
    /// Log every command; door moves still block for the settle time.
    Console,
}

impl std::str::FromStr for HardwareBackend {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(HardwareBackend::None),
            "console" => Ok(HardwareBackend::Console),
            other => Err(AccessError::ActuatorUnavailable(format!(
                "unknown hardware backend '{}'",
                other
            ))),
        }
    }
}

/// Bring up the configured hardware. Called once per run.
pub fn init_hardware(
    backend: HardwareBackend,
    profile: &HardwareProfile,
) -> Result<Box<dyn AccessHardware>, AccessError> {
    profile.validate()?;
    match backend {
        HardwareBackend::None => Err(AccessError::ActuatorUnavailable(
            "hardware backend disabled".to_string(),
        )),
        HardwareBackend::Console => Ok(Box::new(ConsoleHardware::new(profile.clone()))),
    }
}

fn pin_list(pins: &[u8]) -> String {
    pins.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Hardware stand-in that logs each command.
pub struct ConsoleHardware {
    profile: HardwareProfile,
    door_open: Option<bool>,
}

impl ConsoleHardware {
    pub fn new(profile: HardwareProfile) -> Self {
        log::info!(
            "ConsoleHardware: servo=GPIO{} granted=[{}] denied=[{}] lcd=0x{:02x} ({} cols)",
            profile.servo_pin,
            pin_list(&profile.granted_pins),
            pin_list(&profile.denied_pins),
            profile.lcd_address,
            profile.display_columns
        );
        Self {
            profile,
            door_open: None,
        }
    }

    pub fn door_open(&self) -> Option<bool> {
        self.door_open
    }
}

impl AccessHardware for ConsoleHardware {
    fn name(&self) -> &'static str {
        "console"
    }

    fn set_door(&mut self, open: bool) -> Result<(), AccessError> {
        let duty = if open {
            SERVO_OPEN_DUTY
        } else {
            SERVO_CLOSED_DUTY
        };
        log::info!(
            "door: {} (servo GPIO{} duty {:.1}%)",
            if open { "open" } else { "closed" },
            self.profile.servo_pin,
            duty
        );
        std::thread::sleep(self.profile.settle);
        self.door_open = Some(open);
        Ok(())
    }

    fn set_pins(&mut self, granted: bool) -> Result<(), AccessError> {
        let (high, low) = if granted {
            (&self.profile.granted_pins, &self.profile.denied_pins)
        } else {
            (&self.profile.denied_pins, &self.profile.granted_pins)
        };
        log::info!("pins: [{}] HIGH, [{}] LOW", pin_list(high), pin_list(low));
        Ok(())
    }

    fn show_status(&mut self, line1: &str, line2: &str) -> Result<(), AccessError> {
        log::info!("display: {} | {}", line1, line2);
        Ok(())
    }

    fn shutdown(&mut self) {
        log::info!(
            "pins: [{}] LOW; hardware released",
            pin_list(
                &[
                    self.profile.granted_pins.as_slice(),
                    self.profile.denied_pins.as_slice()
                ]
                .concat()
            )
        );
    }
}

/// Hardware double that records every command into a shared log.
///
/// Clones share the same log, so a test can keep one handle while the
/// controller owns another.
#[derive(Clone, Default)]
pub struct RecordingHardware {
    log: Arc<Mutex<Vec<ActuatorCommand>>>,
    failing: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call with this command label fail.
    pub fn fail_on(&self, label: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(label);
        }
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of door commands recorded, by target position.
    pub fn door_moves(&self, open: bool) -> usize {
        self.commands()
            .iter()
            .filter(|c| **c == ActuatorCommand::SetDoor { open })
            .count()
    }

    fn record(&self, command: ActuatorCommand) -> Result<(), AccessError> {
        let label = command.label();
        let fails = self
            .failing
            .lock()
            .map(|failing| failing.contains(&label))
            .unwrap_or(false);
        self.log
            .lock()
            .map_err(|_| AccessError::ActuatorCommand {
                command: label.to_string(),
                reason: "command log lock poisoned".to_string(),
            })?
            .push(command);
        if fails {
            return Err(AccessError::ActuatorCommand {
                command: label.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl AccessHardware for RecordingHardware {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_door(&mut self, open: bool) -> Result<(), AccessError> {
        self.record(ActuatorCommand::SetDoor { open })
    }

    fn set_pins(&mut self, granted: bool) -> Result<(), AccessError> {
        self.record(ActuatorCommand::SetPins { granted })
    }

    fn show_status(&mut self, line1: &str, line2: &str) -> Result<(), AccessError> {
        self.record(ActuatorCommand::ShowStatus {
            line1: line1.to_string(),
            line2: line2.to_string(),
        })
    }

    fn shutdown(&mut self) {
        let _ = self.record(ActuatorCommand::Shutdown);
    }
}

/// One step of the hardware self-test.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfTestStep {
    pub name: &'static str,
    pub result: Result<(), AccessError>,
}

/// Exercise every device in a fixed order: display, door open, door close,
/// granted pins, denied pins, then all pins low. Each step is attempted even
/// if an earlier one failed; `hold` is waited between steps.
pub fn self_test(hw: &mut dyn AccessHardware, hold: Duration) -> Vec<SelfTestStep> {
    let mut steps = Vec::new();
    let mut step = |name: &'static str, result: Result<(), AccessError>| {
        log::info!(
            "self-test: {} {}",
            name,
            if result.is_ok() { "ok" } else { "FAILED" }
        );
        steps.push(SelfTestStep { name, result });
        std::thread::sleep(hold);
    };

    step("display", hw.show_status("TEST LCD", "Line 2"));
    step(
        "door open",
        hw.show_status("Servo test", "Opening...")
            .and_then(|_| hw.set_door(true)),
    );
    step(
        "door close",
        hw.show_status("Servo test", "Closing...")
            .and_then(|_| hw.set_door(false)),
    );
    step(
        "granted pins",
        hw.show_status("ACCESS", "GRANTED")
            .and_then(|_| hw.set_pins(true)),
    );
    step(
        "denied pins",
        hw.show_status("ACCESS", "DENIED")
            .and_then(|_| hw.set_pins(false)),
    );
    hw.shutdown();
    step("shutdown", Ok(()));
    steps
}

/*!
    CiA402 drive profile: the state machine every servo drive follows before accepting motion commands.

    The drive reports its state in the status word (object `0x6041`) and is commanded through the control word (object `0x6040`). The master never sets a state directly, it requests a transition and waits for the status word to show the result.

    ```text
                 NotReadyToSwitchOn
                         | (automatic)
                         v
    Fault --ResetFault--> SwitchOnDisabled <------------------------+
                         |  ^                                        |
                Shutdown |  | DisableVoltage                         |
                         v  |                                        |
                  ReadyToSwitchOn                                    |
                         |  ^                                        |
                SwitchOn |  | Shutdown                               |
                         v  |                                        |
                     SwitchedOn                                      |
                         |  ^                                        |
         EnableOperation |  | DisableOperation                       |
                         v  |                                        |
                  OperationEnabled --QuickStop--> QuickStopActive ---+
    ```
*/

use core::{fmt, str::FromStr};
use bilge::prelude::*;
use crate::{
    data,
    error::AxisError,
    };

/**
bit structure of a status word

| Bit |  Meaning | Presence |
|-----|----------|----------|
| 0	| Ready to switch on	| M
| 1	| Switched on	| M
| 2	| Operation enabled	| M
| 3	| Fault	| M
| 4	| Voltage enabled	| O
| 5	| Quick stop	| O
| 6	| Switch on disabled	| M
| 7	| Warning	| O
| 8	| Manufacturer specific	| O
| 9	| Remote	| O
| 10	| Target reached	| O
| 11	| Internal limit active	| C
| 12-13	| Operation mode specific (Mandatory for csp, csv, cst mode)	| O
| 14-15	| Manufacturer specific	| O
*/
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct StatusWord {
    pub ready_switch_on: bool,
    pub switched_on: bool,
    pub operation_enabled: bool,
    pub fault: bool,
    pub voltage_enabled: bool,
    pub quick_stop: bool,
    pub switch_on_disabled: bool,
    pub warning: bool,
    reserved: u1,
    pub remote: bool,
    pub target_reached: bool,
    pub limit_active: bool,
    pub specific: u2,
    reserved: u2,
}
data::bilge_pdudata!(StatusWord, u16);

impl fmt::Display for StatusWord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "StatusWord{{")?;
		for (active, mark) in [ (self.ready_switch_on(), "rtso"),
								(self.switched_on(), "so"),
								(self.operation_enabled(), "oe"),
								(self.fault(), "f"),
								(self.voltage_enabled(), "ve"),
								(self.quick_stop(), "qs"),
								(self.switch_on_disabled(), "sod"),
								(self.warning(), "w"),
								(self.remote(), "r"),
								(self.target_reached(), "tr"),
								(self.limit_active(), "la"),
								] {
			write!(f, " ")?;
			if active {
				write!(f, "{}", mark)?;
			} else {
				for _ in 0 .. mark.len() {write!(f, " ")?;}
			}
		}
		write!(f, "}}")?;
		Ok(())
	}
}

/**
Control word of a servo drive

| Bit	|	Category	|   Meaning	|
|-------|---------------|-----------|
| 0	|	M	|	Switch on |
| 1	|	M	|	Enable voltage |
| 2	|	O	|	Quick stop |
| 3	|	M	|	Enable operation |
| 4 – 6	|	O	|	Operation mode specific |
| 7	|	M	|	Fault reset |
| 8	|	O	|	Halt |
| 9	|	O	|	Operation mode specific |
| 10	|	O	|	reserved |
| 11 – 15	|	O	|	Manufacturer specific |
*/
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct ControlWord {
    pub switch_on: bool,
    pub enable_voltage: bool,
    pub quick_stop: bool,
    pub enable_operation: bool,
    pub specific: u3,
    pub reset_fault: bool,
    pub halt: bool,
    pub specific_high: bool,
    reserved: u1,
    reserved: u5,
}
data::bilge_pdudata!(ControlWord, u16);

impl fmt::Display for ControlWord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "ControlWord{{") ?;
		for (active, mark) in [ (self.switch_on(), "so"),
								(self.enable_voltage(), "ev"),
								(self.quick_stop(), "qs"),
								(self.enable_operation(), "eo"),
								(self.reset_fault(), "rf"),
								(self.halt(), "h"),
								] {
			write!(f, " ")?;
			if active {
				write!(f, "{}", mark)?;
			} else {
				for _ in 0 .. mark.len() {write!(f, " ")?;}
			}
		}
		write!(f, "}}")?;
		Ok(())
	}
}


/// servodrive control-loop type, object `0x6060`
#[bitsize(8)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperationMode {
	Off = 0,
	ProfilePosition = 1,
	Velocity = 2,
	ProfileVelocity = 3,
	TorqueProfile = 4,
	Homing = 6,
	InterpolatedPosition = 7,

	/// CSP
	SynchronousPosition = 8,
	/// CSV
	SynchronousVelocity = 9,
	/// CST
	SynchronousTorque = 10,
	SynchronousTorqueCommutation = 11,
}
data::bilge_pdudata!(OperationMode, u8);

/// only the cyclic synchronous modes can be selected by name, the others are not driven by this crate
impl FromStr for OperationMode {
    type Err = AxisError;
    fn from_str(name: &str) -> Result<Self, AxisError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csp" => Ok(Self::SynchronousPosition),
            "csv" => Ok(Self::SynchronousVelocity),
            "cst" => Ok(Self::SynchronousTorque),
            _ => Err(AxisError::Config(format!(
                "unsupported operation mode {:?}, expected one of csp, csv, cst", name))),
        }
    }
}


/// state of a drive, as decoded from its status word
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DriveState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
}
use DriveState::*;

/**
    (mask, value, state) for each state, checked in order

    fault reaction is the only state with the fault bit set that is not [Fault], every other word with the fault bit goes to [Fault] before any other pattern is tried
*/
const STATUS_PATTERNS: [(u16, u16, DriveState); 8] = [
    (0b0100_1111, 0b0000_1111, FaultReactionActive),
    (0b0000_1000, 0b0000_1000, Fault),
    (0b0100_1111, 0b0000_0000, NotReadyToSwitchOn),
    (0b0100_1111, 0b0100_0000, SwitchOnDisabled),
    (0b0110_1111, 0b0010_0001, ReadyToSwitchOn),
    (0b0110_1111, 0b0010_0011, SwitchedOn),
    (0b0110_1111, 0b0010_0111, OperationEnabled),
    (0b0110_1111, 0b0000_0111, QuickStopActive),
];

/// decode the drive state from a raw status word
pub fn decode_status(word: u16) -> DriveState {
    STATUS_PATTERNS.iter()
        .find(|(mask, value, _)| word & mask == *value)
        .map(|&(_, _, state)| state)
        // words matching no pattern are inconsistent, the drive is not ready whatever it means
        .unwrap_or(NotReadyToSwitchOn)
}

impl From<StatusWord> for DriveState {
    fn from(status: StatusWord) -> Self {decode_status(u16::from(status))}
}


/// transition of the drive state machine requested through the control word
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Transition {
    /// leave [Fault] for [SwitchOnDisabled], on the rising edge of the fault reset bit
    ResetFault,
    Shutdown,
    SwitchOn,
    EnableOperation,
    DisableVoltage,
    QuickStop,
    DisableOperation,
}

impl Transition {
    /// name used in logs and timeouts
    pub fn label(self) -> &'static str {
        match self {
            Self::ResetFault => "reset fault",
            Self::Shutdown => "shutdown",
            Self::SwitchOn => "switch on",
            Self::EnableOperation => "enable operation",
            Self::DisableVoltage => "disable voltage",
            Self::QuickStop => "quick stop",
            Self::DisableOperation => "disable operation",
        }
    }

    /// control word requesting this transition
    pub fn control_word(self) -> ControlWord {
        let mut control = ControlWord::from(0u16);
        match self {
            Self::ResetFault => {
                control.set_reset_fault(true);
            },
            Self::Shutdown => {
                control.set_quick_stop(true);
                control.set_enable_voltage(true);
            },
            Self::SwitchOn | Self::DisableOperation => {
                control.set_quick_stop(true);
                control.set_enable_voltage(true);
                control.set_switch_on(true);
            },
            Self::EnableOperation => {
                control.set_quick_stop(true);
                control.set_enable_voltage(true);
                control.set_switch_on(true);
                control.set_enable_operation(true);
            },
            Self::DisableVoltage => {},
            Self::QuickStop => {
                control.set_enable_voltage(true);
            },
        }
        control
    }

    /**
        true if the given state shows the transition is done

        drives are allowed to go on from [SwitchedOn] to [OperationEnabled] by themselves, so switching on is also done when the operation is already enabled
    */
    pub fn accepts(self, state: DriveState) -> bool {
        match self {
            Self::ResetFault => state == SwitchOnDisabled,
            Self::Shutdown => state == ReadyToSwitchOn,
            Self::SwitchOn => matches!(state, SwitchedOn | OperationEnabled),
            Self::EnableOperation => state == OperationEnabled,
            Self::DisableVoltage => state == SwitchOnDisabled,
            Self::QuickStop => matches!(state, QuickStopActive | SwitchOnDisabled),
            Self::DisableOperation => state == SwitchedOn,
        }
    }
}

/// raw control word requesting the given transition
pub fn control_word_for(transition: Transition) -> u16 {
    u16::from(transition.control_word())
}

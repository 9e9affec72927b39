/*!
    Bring-up and cyclic control of CiA402 servo axes over CANopen-over-Ethernet.

    Each drive is reached through two IP channels: SDO frames on a TCP stream configure it, PDO frames on UDP drive it cyclically. See [Axis] for the entry point.
*/

pub mod socket;
pub mod data;
pub mod can;
pub mod sdo;
pub mod pdo;
pub mod cia402;
pub mod cyclic;
pub mod locator;
pub mod printer;
pub mod config;
pub mod axis;
pub mod error;

pub use crate::data::PduData;
pub use crate::socket::*;
pub use crate::can::{Can, SdoFrame, SdoReply, SdoAbortCode};
pub use crate::sdo::{SdoValue, DictionaryEntry, ObjectDictionary, DictionaryProvider};
pub use crate::pdo::{PdoIn, PdoOut};
pub use crate::cia402::{DriveState, Transition, OperationMode};
pub use crate::cyclic::PdoSession;
pub use crate::locator::{NodeLocator, NodeLocatorCache, NodePorts, StaticLocator};
pub use crate::printer::{Printer, LogPrinter};
pub use crate::config::AxisConfig;
pub use crate::axis::{Axis, AxisContext, BringUp};
pub use crate::error::{AxisError, AxisResult};

//! timing settings of an axis

use core::time::Duration;

/**
    settings shared by the SDO and PDO sessions of an axis

    The defaults suit a drive on a local network. Tests and simulators usually shorten every duration.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AxisConfig {
    /// number of times an SDO request is sent before giving up on the peer
    pub sdo_attempts: usize,
    /// time waited for an SDO answer before sending the request again
    pub sdo_reply_timeout: Duration,
    /// time allowed to each transition of the drive state machine during bring-up
    pub transition_timeout: Duration,
    /// pause between closing the SDO stream and opening the PDO channel, the drive needs it to tear the TCP connection down
    pub reopen_pause: Duration,
    /// period of the PDO exchange
    pub cycle_period: Duration,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            sdo_attempts: 5,
            sdo_reply_timeout: Duration::from_millis(500),
            transition_timeout: Duration::from_secs(3),
            reopen_pause: Duration::from_millis(500),
            cycle_period: Duration::from_millis(10),
        }
    }
}

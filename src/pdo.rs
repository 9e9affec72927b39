/*!
    process data frames exchanged cyclically with a drive

    Both frames have a fixed layout known by both sides, there is no header: the position of a value in the datagram tells what it is.

    | direction | frame | content |
    |-----------|-------|---------|
    | master -> drive | [PdoOut] | control word `0x6040`, operation mode `0x6060`, target velocity `0x60ff`, target position `0x607a`, target torque `0x6071` |
    | drive -> master | [PdoIn] | status word `0x6041`, operation mode display `0x6061`, actual velocity `0x606c`, actual position `0x6064`, actual torque `0x6077`, error code `0x603f` |
*/

use crate::{
    cia402::{ControlWord, StatusWord, OperationMode},
    data::{PduData, PackingResult, Cursor},
    };


/// values sent to the drive every cycle
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PdoOut {
    pub control_word: ControlWord,
    pub operation_mode: OperationMode,
    pub target_velocity: i32,
    pub target_position: i32,
    pub target_torque: i16,
}
impl Default for PdoOut {
    fn default() -> Self {
        Self {
            control_word: ControlWord::from(0u16),
            operation_mode: OperationMode::Off,
            target_velocity: 0,
            target_position: 0,
            target_torque: 0,
        }
    }
}
impl PduData for PdoOut {
    const LEN: usize = 13;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()> {
        let mut frame = Cursor::new(dst);
        frame.pack(&self.control_word)?;
        frame.pack(&self.operation_mode)?;
        frame.pack(&self.target_velocity)?;
        frame.pack(&self.target_position)?;
        frame.pack(&self.target_torque)?;
        Ok(())
    }
    fn unpack(src: &[u8]) -> PackingResult<Self> {
        let mut frame = Cursor::new(src);
        Ok(Self {
            control_word: frame.unpack()?,
            operation_mode: frame.unpack()?,
            target_velocity: frame.unpack()?,
            target_position: frame.unpack()?,
            target_torque: frame.unpack()?,
        })
    }
}

/// values received from the drive every cycle
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PdoIn {
    pub status_word: StatusWord,
    /// raw mode reported by the drive, it may report modes this crate does not know
    pub operation_mode_display: u8,
    pub actual_velocity: i32,
    pub actual_position: i32,
    pub actual_torque: i16,
    /// last error reported by the drive, 0 if none
    pub error_code: u16,
}
impl Default for PdoIn {
    fn default() -> Self {
        Self {
            status_word: StatusWord::from(0u16),
            operation_mode_display: 0,
            actual_velocity: 0,
            actual_position: 0,
            actual_torque: 0,
            error_code: 0,
        }
    }
}
impl PduData for PdoIn {
    const LEN: usize = 15;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()> {
        let mut frame = Cursor::new(dst);
        frame.pack(&self.status_word)?;
        frame.pack(&self.operation_mode_display)?;
        frame.pack(&self.actual_velocity)?;
        frame.pack(&self.actual_position)?;
        frame.pack(&self.actual_torque)?;
        frame.pack(&self.error_code)?;
        Ok(())
    }
    fn unpack(src: &[u8]) -> PackingResult<Self> {
        let mut frame = Cursor::new(src);
        Ok(Self {
            status_word: frame.unpack()?,
            operation_mode_display: frame.unpack()?,
            actual_velocity: frame.unpack()?,
            actual_position: frame.unpack()?,
            actual_torque: frame.unpack()?,
            error_code: frame.unpack()?,
        })
    }
}

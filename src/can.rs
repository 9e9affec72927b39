//! implementation of CoE (Canopen Over Ethernet) SDO transfers

use std::{sync::Arc, net::SocketAddr};
use core::{fmt, time::Duration};
use tokio::time::Instant;
use bilge::prelude::*;
use log::Level;
use crate::{
    socket::{self, CoeSocket},
    sdo::{DictionaryEntry, ObjectDictionary},
    error::{AxisError, AxisResult},
    config::AxisConfig,
    printer::Printer,
    };


/// byte size of every SDO request or response: coe header, sdo header, index, subindex, 4 bytes of data
pub const SDO_FRAME_SIZE: usize = 10;
/// maximum byte size of sdo data that can be expedited
const EXPEDITED_MAX_SIZE: usize = 4;
/// receive buffer, a frame may arrive in pieces or glued to the next one
const SDO_RECEIVE_SIZE: usize = 64;

/**
    SDO client of one drive.

    It works exactly as in a Can bus, except each of its frame is encapsulated in a TCP stream instead of a can frame. Only expedited transfers are done, every value of the dictionary fits in 4 bytes.

    Requests are strictly sequential: a request is sent, then its answer is waited for, and only then the next request can be sent. The peer may lose requests, so each one is sent again when no answer comes in time, up to [AxisConfig::sdo_attempts] times.

    ```text
    master                        drive
      | --- download 0x6060:00 ---> |
      |            (lost)           |
      | --- download 0x6060:00 ---> |     resend after sdo_reply_timeout
      | <-- response 0x6060:00 ---- |
      | --- download 0x607a:00 ---> |
      ...
    ```

    A resent request may also have been only slow, in which case the drive answers every copy. The first answer completes the transfer, the extra copies are dropped when they arrive during the next transfer.

    ```text
    master                        drive
      | --- download 0x6060:00 ---> |
      | --- download 0x6060:00 ---> |     resend after sdo_reply_timeout
      | <-- response 0x6060:00 ---- |     accepted
      | --- download 0x607a:00 ---> |
      | <-- response 0x6060:00 ---- |     dropped
      | <-- response 0x607a:00 ---- |     accepted
    ```
*/
pub struct Can<S> {
    socket: S,
    attempts: usize,
    reply_timeout: Duration,
    printer: Arc<dyn Printer>,
    /// bytes received and not yet consumed, the stream does not keep frame boundaries
    buffer: [u8; SDO_RECEIVE_SIZE],
    received: usize,
    /// item of the last transfer and how many of its answers may still come
    late: Option<((u16, u8), usize)>,
}
impl<S: CoeSocket> Can<S> {
    pub fn new(socket: S, config: &AxisConfig, printer: Arc<dyn Printer>) -> Self {
        Self {
            socket,
            attempts: config.sdo_attempts,
            reply_timeout: config.sdo_reply_timeout,
            printer,
            buffer: [0; SDO_RECEIVE_SIZE],
            received: 0,
            late: None,
        }
    }
    /// address of the SDO server
    pub fn peer(&self) -> SocketAddr {self.socket.peer()}

    /**
        download every entry of the dictionary, in order

        The first entry failing stops the download, the following entries are not sent.
    */
    pub async fn download_all(&mut self, dictionary: &ObjectDictionary) -> AxisResult {
        self.printer.print(Level::Info, format_args!(
            "downloading {} SDO entries to {}", dictionary.len(), self.peer()));
        for entry in dictionary {
            self.download(entry).await?;
        }
        Ok(())
    }

    /// write one entry to the drive, returns the drive's acknowledge
    pub async fn download(&mut self, entry: &DictionaryEntry) -> AxisResult<SdoReply> {
        self.printer.print(Level::Debug, format_args!("SDO download {}", entry));
        let reply = self.exchange(&encode_download(entry), (entry.index, entry.sub)).await?;
        check_reply(&reply, (entry.index, entry.sub), SdoCommandResponse::Download)?;
        Ok(reply)
    }

    /// read one entry from the drive, the returned frame holds its 4 bytes of data
    pub async fn upload(&mut self, index: u16, sub: u8) -> AxisResult<SdoReply> {
        let reply = self.exchange(&encode_upload(index, sub), (index, sub)).await?;
        check_reply(&reply, (index, sub), SdoCommandResponse::Upload)?;
        self.printer.print(Level::Debug, format_args!(
            "SDO upload {:#06x}:{:02x} = {:#010x}", index, sub, reply.as_u32()));
        Ok(reply)
    }

    /// give the socket back, dropping the answers not consumed yet
    pub fn into_inner(self) -> S {
        if self.received != 0 || self.late.map_or(false, |(_, count)| count != 0)
            {log::debug!("SDO answers from {} left unread", self.socket.peer())}
        self.socket
    }

    /// drop the socket, which closes the TCP stream
    pub fn close(self) {
        let peer = self.socket.peer();
        drop(self.into_inner());
        log::debug!("SDO stream to {} closed", peer);
    }

    /// send a request until something comes back, the answer is not checked here
    async fn exchange(&mut self, request: &[u8; SDO_FRAME_SIZE], expected: (u16, u8)) -> AxisResult<SdoReply> {
        let mut sent = 0;
        for attempt in 1 ..= self.attempts {
            log::trace!("SDO request {:02x?} attempt {}", request, attempt);
            socket::send(&self.socket, request).await?;
            sent += 1;

            let deadline = Instant::now() + self.reply_timeout;
            loop {
                let frame = match tokio::time::timeout_at(deadline, self.receive_frame()).await {
                    Ok(frame) => frame?,
                    Err(_) => None,
                };
                let Some(reply) = frame
                    else {
                        self.check_truncated(expected)?;
                        log::warn!("no SDO answer from {} for {:#06x}:{:02x} (attempt {}/{})",
                            self.socket.peer(), expected.0, expected.1, attempt, self.attempts);
                        break
                    };
                if self.is_late(&reply) {
                    log::debug!("dropping late SDO answer about {:#06x}:{:02x}", reply.index, reply.sub);
                    continue
                }
                self.late = Some((expected, sent - 1));
                return Ok(reply);
            }
        }
        self.late = Some((expected, sent));
        Err(AxisError::SdoTransport {
            remote: self.socket.peer(),
            attempts: self.attempts,
        })
    }

    /// next complete frame of the stream, `None` if the stream is closed
    async fn receive_frame(&mut self) -> AxisResult<Option<SdoReply>> {
        while self.received < SDO_FRAME_SIZE {
            let size = socket::receive(&self.socket, &mut self.buffer[self.received ..]).await?;
            if size == 0
                {return Ok(None)}
            self.received += size;
        }
        let mut frame = [0; SDO_FRAME_SIZE];
        frame.copy_from_slice(&self.buffer[.. SDO_FRAME_SIZE]);
        self.buffer.copy_within(SDO_FRAME_SIZE .. self.received, 0);
        self.received -= SDO_FRAME_SIZE;
        log::trace!("SDO answer {:02x?}", frame);
        Ok(Some(SdoFrame::from_bytes(&frame)))
    }

    /// whether the frame answers a copy of the previous request
    fn is_late(&mut self, reply: &SdoReply) -> bool {
        match &mut self.late {
            Some((item, count)) if *count != 0 && (reply.index, reply.sub) == *item => {
                *count -= 1;
                true
            },
            _ => false,
        }
    }

    /// the answer stopped in the middle of a frame
    fn check_truncated(&mut self, expected: (u16, u8)) -> AxisResult {
        let Some(partial) = decode_response(&self.buffer[.. self.received])
            else {return Ok(())};
        self.received = 0;
        Err(AxisError::SdoProtocol {
            expected,
            got: (partial.index, partial.sub),
            abort: None,
            message: "SDO answer has wrong size",
        })
    }
}

/// check an answer matches the request it was waited for
fn check_reply(reply: &SdoReply, expected: (u16, u8), command: SdoCommandResponse) -> AxisResult {
    let got = (reply.index, reply.sub);
    let error = |message, abort| Err(AxisError::SdoProtocol {expected, got, abort, message});

    match reply.service() {
        Some(CanService::SdoResponse) => {
            if got != expected
                {return error("slave answered about wrong item", None)}
            if SdoCommandResponse::try_from(reply.command()).ok() != Some(command)
                {return error("slave answered with wrong operation", None)}
            Ok(())
        },
        Some(CanService::SdoRequest) if reply.abort_code().is_some() => {
            error("slave aborted the transfer", reply.abort_code())
        },
        Some(CanService::SdoRequest) => error("slave answered a COE request", None),
        _ => error("unexpected COE service during SDO operation", None),
    }
}



/// build the request writing the given entry
pub fn encode_download(entry: &DictionaryEntry) -> [u8; SDO_FRAME_SIZE] {
    SdoFrame {
        coe: CoeHeader::new(u9::new(0), CanService::SdoRequest).into(),
        header: SdoHeader::new(
                    true,
                    true,
                    u2::new(0),  // 4 bytes used
                    false,
                    u3::from(SdoCommandRequest::Download),
                    ),
        index: entry.index,
        sub: entry.sub,
        value: entry.value.to_le_bytes(),
    }.to_bytes()
}

/// build the request reading the given entry
pub fn encode_upload(index: u16, sub: u8) -> [u8; SDO_FRAME_SIZE] {
    SdoFrame {
        coe: CoeHeader::new(u9::new(0), CanService::SdoRequest).into(),
        header: SdoHeader::new(
                    false,
                    false,
                    u2::new(0),
                    false,
                    u3::from(SdoCommandRequest::Upload),
                    ),
        index,
        sub,
        value: [0; EXPEDITED_MAX_SIZE],
    }.to_bytes()
}

/**
    read an answer received from the SDO server

    Returns `None` when nothing was received, which is not the same as receiving garbage: any non-empty input gives a frame, missing bytes being read as zeros. Whether the frame makes sense for the pending request is up to the caller.
*/
pub fn decode_response(bytes: &[u8]) -> Option<SdoReply> {
    if bytes.is_empty()
        {return None}
    let mut padded = [0; SDO_FRAME_SIZE];
    let size = bytes.len().min(SDO_FRAME_SIZE);
    padded[.. size].copy_from_slice(&bytes[.. size]);
    Some(SdoFrame::from_bytes(&padded))
}


/**
    SDO request or response as exchanged on the wire

    | bytes | content |
    |-------|---------|
    | 0..2  | [CoeHeader] |
    | 2     | [SdoHeader] |
    | 3..5  | index |
    | 5     | subindex |
    | 6..10 | data, or abort code |
*/
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SdoFrame {
    /// raw CoE header, kept raw since a broken peer may send services unknown to [CanService]
    pub coe: u16,
    pub header: SdoHeader,
    pub index: u16,
    pub sub: u8,
    pub value: [u8; EXPEDITED_MAX_SIZE],
}
/// a frame received from the SDO server
pub type SdoReply = SdoFrame;

impl SdoFrame {
    /// successful answer to a request, as a drive sends it
    pub fn response(command: SdoCommandResponse, index: u16, sub: u8, value: [u8; EXPEDITED_MAX_SIZE]) -> Self {
        let expedited = command == SdoCommandResponse::Upload;
        Self {
            coe: CoeHeader::new(u9::new(0), CanService::SdoResponse).into(),
            header: SdoHeader::new(expedited, expedited, u2::new(0), false, u3::from(command)),
            index,
            sub,
            value,
        }
    }
    /// refusal of a request, as a drive sends it
    pub fn abort(index: u16, sub: u8, code: u32) -> Self {
        Self {
            coe: CoeHeader::new(u9::new(0), CanService::SdoRequest).into(),
            header: SdoHeader::new(false, false, u2::new(0), false, u3::from(SdoCommandRequest::Abort)),
            index,
            sub,
            value: code.to_le_bytes(),
        }
    }

    pub fn to_bytes(&self) -> [u8; SDO_FRAME_SIZE] {
        let mut frame = [0; SDO_FRAME_SIZE];
        frame[0..2].copy_from_slice(&self.coe.to_le_bytes());
        frame[2] = u8::from(self.header);
        frame[3..5].copy_from_slice(&self.index.to_le_bytes());
        frame[5] = self.sub;
        frame[6..10].copy_from_slice(&self.value);
        frame
    }
    pub fn from_bytes(frame: &[u8; SDO_FRAME_SIZE]) -> Self {
        Self {
            coe: u16::from_le_bytes([frame[0], frame[1]]),
            header: SdoHeader::from(frame[2]),
            index: u16::from_le_bytes([frame[3], frame[4]]),
            sub: frame[5],
            value: [frame[6], frame[7], frame[8], frame[9]],
        }
    }

    /// CoE service of this frame, `None` if the service is not a known one
    pub fn service(&self) -> Option<CanService> {
        CoeHeader::try_from(self.coe).ok().map(|header| header.service())
    }
    /// raw command specifier, to read as [SdoCommandRequest] or [SdoCommandResponse] depending on the service
    pub fn command(&self) -> u3 {self.header.command()}
    /// true if the frame is a response, whatever it answers to
    pub fn is_response(&self) -> bool {
        self.service() == Some(CanService::SdoResponse)
    }
    /// abort code if this frame is a transfer abort
    pub fn abort_code(&self) -> Option<u32> {
        if self.service() == Some(CanService::SdoRequest)
        && SdoCommandRequest::try_from(self.command()).ok() == Some(SdoCommandRequest::Abort)
            {Some(self.as_u32())}
        else
            {None}
    }
    pub fn as_u32(&self) -> u32 {u32::from_le_bytes(self.value)}
    pub fn as_i32(&self) -> i32 {i32::from_le_bytes(self.value)}
    pub fn as_f32(&self) -> f32 {f32::from_le_bytes(self.value)}
}
impl fmt::Debug for SdoFrame {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "SdoFrame {{coe: {:#06x}, header: {:#04x}, index: {:#06x}, sub: {}, value: {:02x?}}}",
            self.coe, u8::from(self.header), self.index, self.sub, self.value)
	}
}


#[bitsize(16)]
#[derive(TryFromBits, DebugBits, Copy, Clone)]
pub struct CoeHeader {
    /// present in the Can protocol, but not used in CoE
    pub number: u9,
    reserved: u3,
    /// Can command
    pub service: CanService,
}

/**
    Type of can service

    receiving and transmiting is from the point of view of the slave:
        - transmitting is slave -> master
        - receiving is master -> slave
*/
#[bitsize(4)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CanService {
    Emergency = 0x1,
    SdoRequest = 0x2,
    SdoResponse = 0x3,
    TransmitPdo = 0x4,
    ReceivePdo = 0x5,
    TransmitPdoRemoteRequest = 0x6,
    ReceivePdoRemoteRequest = 0x7,
    SdoInformation = 0x8,
}

/// Header for operations with SDOs
///
/// ETG.1000.6 5.6.2
#[bitsize(8)]
#[derive(FromBits, DebugBits, Copy, Clone, PartialEq, Eq)]
pub struct SdoHeader {
    /// true if field `size` is used
    pub sized: bool,
    /// true in case of an expedited transfer (the data size specified by `size`)
    pub expedited: bool,
    /// indicate the data size but not as an integer.
    /// this value shall be `4 - data.len()`
    pub size: u2,
    /// true if a complete SDO is accessed
    pub complete: bool,
    /// operation to perform with the indexed SDO, this should be a value of [SdoCommandRequest] or [SdoCommandResponse]
    pub command: u3,
}

/// request operation to perform with an SDO in CoE
///
/// ETG.1000.6 5.6.2.1-7
#[bitsize(3)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdoCommandRequest {
    Download = 0x1,
    DownloadSegment = 0x0,
    Upload = 0x2,
    UploadSegment = 0x3,
    Abort = 0x4,
}

/// response operation to perform with an SDO in CoE
///
/// ETG.1000.6 5.6.2.1-7
#[bitsize(3)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdoCommandResponse {
    Download = 0x3,
    DownloadSegment = 0x1,
    Upload = 0x2,
    UploadSegment = 0x0,
    Abort = 0x4,
}

#[bitsize(32)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdoAbortCode {
    /// Toggle bit not changed
    BadToggle = 0x05_03_00_00,
    /// SDO protocol timeout
    Timeout = 0x05_04_00_00,
    /// Client/Server command specifier not valid or unknown
    UnsupportedCommand = 0x05_04_00_01,
    /// Out of memory
    OufOfMemory = 0x05_04_00_05,
    /// Unsupported access to an object, this is raised when trying to access a complete SDO when complete SDO access is not supported
    UnsupportedAccess = 0x06_01_00_00,
    /// Attempt to read to a write only object
    WriteOnly = 0x06_01_00_01,
    /// Attempt to write to a read only object
    ReadOnly = 0x06_01_00_02,
    /// Subindex cannot be written, SI0 must be 0 for write access
    WriteError = 0x06_01_00_03,
    /// SDO Complete access not supported for objects of variable length such as ENUM object types
    VariableLength = 0x06_01_00_04,
    /// Object length exceeds mailbox size
    ObjectTooBig = 0x06_01_00_05,
    /// Object mapped to RxPDO, SDO Download blocked
    LockedByPdo = 0x06_01_00_06,
    /// The object does not exist in the object directory
    InvalidIndex = 0x06_02_00_00,
    /// The object can not be mapped into the PDO
    CannotMap = 0x06_04_00_41,
    /// The number and length of the objects to be mapped would exceed the PDO length
    PdoTooSmall = 0x06_04_00_42,
    /// General parameter incompatibility reason
    IncompatibleParameter = 0x06_04_00_43,
    /// General internal incompatibility in the device
    IncompatibleDevice = 0x06_04_00_47,
    /// Access failed due to a hardware error
    HardwareError = 0x06_06_00_00,
    /// Data type does not match, length of service parameter does not match
    InvalidLength = 0x06_07_00_10,
    /// Data type does not match, length of service parameter too high
    ServiceTooBig = 0x06_07_00_12,
    /// Data type does not match, length of service parameter too low
    ServiceTooSmall = 0x06_07_00_13,
    /// Subindex does not exist
    InvalidSubIndex = 0x06_09_00_11,
    /// Value range of parameter exceeded (only for write access)
    ValueOutOfRange = 0x06_09_00_30,
    /// Value of parameter written too high
    ValueTooHigh = 0x06_09_00_31,
    /// Value of parameter written too low
    ValueTooLow = 0x06_09_00_32,
    /// Maximum value is less than minimum value
    InvalidRange = 0x06_09_00_36,
    /// General error
    GeneralError = 0x08_00_00_00,
    /**
    Data cannot be transferred or stored to the application

    NOTE: This is the general Abort Code in case no further detail on the reason can determined. It is recommended to use one of the more detailed Abort Codes (0x08000021, 0x08000022)
    */
    Refused = 0x08_00_00_20,
    /**
    Data cannot be transferred or stored to the application because of local control

    NOTE: “local control” means an application specific reason.
    */
    ApplicationRefused = 0x08_00_00_21,
    /// Data cannot be transferred or stored to the application because of the present device state
    StateRefused = 0x08_00_00_22,
    /// Object dictionary dynamic generation fails or no object dictionary is present
    DictionnaryEmpty = 0x08_00_00_23,
}

impl SdoAbortCode {
    /// human readable meaning of the code
    pub fn description(self) -> &'static str {
        match self {
            Self::BadToggle => "toggle bit not alternated",
            Self::Timeout => "SDO protocol timed out",
            Self::UnsupportedCommand => "client/server command specifier not valid or unknown",
            Self::OufOfMemory => "out of memory",
            Self::UnsupportedAccess => "unsupported access to an object",
            Self::WriteOnly => "attempt to read a write only object",
            Self::ReadOnly => "attempt to write a read only object",
            Self::WriteError => "subindex cannot be written, SI0 must be 0 for write access",
            Self::VariableLength => "complete access not supported for objects of variable length",
            Self::ObjectTooBig => "object length exceeds mailbox size",
            Self::LockedByPdo => "object mapped to RxPDO, SDO download blocked",
            Self::InvalidIndex => "object does not exist in the object dictionary",
            Self::CannotMap => "object cannot be mapped to the PDO",
            Self::PdoTooSmall => "number and length of the objects to be mapped would exceed PDO length",
            Self::IncompatibleParameter => "general parameter incompatibility",
            Self::IncompatibleDevice => "general internal incompatibility in the device",
            Self::HardwareError => "access failed due to a hardware error",
            Self::InvalidLength => "data type does not match, length of service parameter does not match",
            Self::ServiceTooBig => "data type does not match, length of service parameter too high",
            Self::ServiceTooSmall => "data type does not match, length of service parameter too low",
            Self::InvalidSubIndex => "subindex does not exist",
            Self::ValueOutOfRange => "value range of parameter exceeded",
            Self::ValueTooHigh => "value of parameter written too high",
            Self::ValueTooLow => "value of parameter written too low",
            Self::InvalidRange => "maximum value is less than minimum value",
            Self::GeneralError => "general error",
            Self::Refused => "data cannot be transferred or stored to the application",
            Self::ApplicationRefused => "data cannot be transferred or stored to the application because of local control",
            Self::StateRefused => "data cannot be transferred or stored to the application because of the present device state",
            Self::DictionnaryEmpty => "object dictionary dynamic generation fails or no object dictionary is present",
        }
    }
}
impl fmt::Display for SdoAbortCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010x} {}", u32::from(*self), self.description())
    }
}

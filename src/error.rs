//! definition of the general axis error type

use std::{sync::Arc, net::SocketAddr};
use crate::{
    can::SdoAbortCode,
    cia402::DriveState,
    data::PackingError,
    };

/**
    general object reporting an unexpected result regarding the axis communication

    Its variants are meant to help finding the cause responsible for the problem and how to deal with it.

    Every variant is cheap to clone, so an error captured by the background PDO exchange can be posted for the foreground to pick up.
*/
#[derive(Clone, Debug, thiserror::Error)]
pub enum AxisError {
    /// error caused by communication support
    ///
    /// these errors are exterior to this library
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// bad settings given by the user, detected before any communication happens
    #[error("configuration error: {0}")]
    Config(String),

    /// the SDO peer did not answer any of the attempts made for one request
    #[error("no SDO answer from {remote} after {attempts} attempts")]
    SdoTransport {
        remote: SocketAddr,
        attempts: usize,
    },

    /**
        the SDO peer answered something that does not match the outstanding request

        `abort` holds the code sent by the peer when it refused the request
    */
    #[error("SDO {} answered about {}: {message}{}", describe_sdo(.expected), describe_sdo(.got), describe_abort(.abort))]
    SdoProtocol {
        expected: (u16, u8),
        got: (u16, u8),
        abort: Option<u32>,
        message: &'static str,
    },

    /// a drive transition has not been observed before its deadline
    #[error("{transition} not reached in time, drive stayed in {last:?}")]
    Timeout {
        transition: &'static str,
        last: DriveState,
    },

    /// error detected in the cyclic frames exchanged with the drive
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// the PDO session has been closed while still in use
    #[error("PDO session closed")]
    Closed,
}

/// convenient alias to simplify return annotations
pub type AxisResult<T=()> = core::result::Result<T, AxisError>;

fn describe_sdo(&(index, sub): &(u16, u8)) -> String {
    format!("{:#06x}:{:02x}", index, sub)
}

fn describe_abort(abort: &Option<u32>) -> String {
    match abort {
        None => String::new(),
        Some(code) => match SdoAbortCode::try_from(*code) {
            Ok(known) => format!(" (abort {:#010x}: {})", code, known.description()),
            Err(_) => format!(" (abort {:#010x}: unknown code)", code),
        },
    }
}

impl From<std::io::Error> for AxisError {
    fn from(src: std::io::Error) -> Self {
        AxisError::Io(Arc::new(src))
    }
}

impl From<PackingError> for AxisError {
    fn from(src: PackingError) -> Self {
        AxisError::Protocol(match src {
            PackingError::BadSize(_, text) => text,
            PackingError::InvalidValue(text) => text,
        })
    }
}

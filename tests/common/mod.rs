//! stub sockets and a loopback drive shared by the integration tests

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}},
    task::{Context, Poll},
    time::Duration,
    };
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, UdpSocket},
    };
use coeaxis::{
    CoeSocket, PduData,
    AxisConfig, DriveState, PdoIn, PdoOut,
    can::{SdoFrame, SdoCommandResponse, SDO_FRAME_SIZE},
    };


pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// durations short enough for tests on the loopback interface
pub fn fast_config() -> AxisConfig {
    AxisConfig {
        sdo_attempts: 5,
        sdo_reply_timeout: Duration::from_millis(50),
        transition_timeout: Duration::from_millis(500),
        reopen_pause: Duration::from_millis(10),
        cycle_period: Duration::from_millis(2),
    }
}


type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/**
    socket answering each frame sent with what the responder returns

    receiving stays pending forever when the responder returned nothing, as a silent peer would
*/
pub struct StubSocket {
    responder: Responder,
    replies: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    sends: AtomicUsize,
}
impl StubSocket {
    pub fn new(responder: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            sends: AtomicUsize::new(0),
        }
    }
    pub fn silent() -> Self {
        Self::new(|_| None)
    }
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}
impl CoeSocket for StubSocket {
    fn poll_receive(&self, _cx: &mut Context<'_>, data: &mut [u8]) -> Poll<io::Result<usize>> {
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => {
                data[.. reply.len()].copy_from_slice(&reply);
                Poll::Ready(Ok(reply.len()))
            },
            None => Poll::Pending,
        }
    }
    fn poll_send(&self, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<()>> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(data.to_vec());
        if let Some(reply) = (self.responder)(data) {
            self.replies.lock().unwrap().push_back(reply);
        }
        Poll::Ready(Ok(()))
    }
    fn peer(&self) -> SocketAddr {
        SocketAddr::new(LOCALHOST, 5000)
    }
}
/// answer a request the way a well behaving drive does, keeping `value` as the read value
pub fn acknowledge(request: &[u8], value: [u8; 4]) -> Vec<u8> {
    let request = SdoFrame::from_bytes(request.try_into().unwrap());
    let command = match request.header.command().value() {
        1 => SdoCommandResponse::Download,
        _ => SdoCommandResponse::Upload,
    };
    SdoFrame::response(command, request.index, request.sub, value).to_bytes().to_vec()
}


/// status word a drive reports in each state
pub fn status_of(state: DriveState) -> u16 {
    match state {
        DriveState::NotReadyToSwitchOn => 0x0000,
        DriveState::SwitchOnDisabled => 0x0040,
        DriveState::ReadyToSwitchOn => 0x0021,
        DriveState::SwitchedOn => 0x0023,
        DriveState::OperationEnabled => 0x0027,
        DriveState::QuickStopActive => 0x0007,
        DriveState::FaultReactionActive => 0x000f,
        DriveState::Fault => 0x0008,
    }
}

/// state a drive goes to when receiving a control word
pub fn react(state: DriveState, control: u16, stuck_in_fault: bool) -> DriveState {
    use DriveState::*;
    match (state, control) {
        (Fault, control) if control & 0x80 != 0 && ! stuck_in_fault => SwitchOnDisabled,
        (Fault, _) => Fault,
        (_, 0x0000) => SwitchOnDisabled,
        (SwitchOnDisabled, 0x0006) => ReadyToSwitchOn,
        (ReadyToSwitchOn, 0x0007) => SwitchedOn,
        (SwitchedOn, 0x000f) => OperationEnabled,
        (OperationEnabled, 0x0007) => SwitchedOn,
        (SwitchedOn | OperationEnabled, 0x0006) => ReadyToSwitchOn,
        (OperationEnabled, 0x0002) => QuickStopActive,
        (state, _) => state,
    }
}


/// what the loopback drive has seen so far
#[derive(Default)]
pub struct DriveRecord {
    /// SDO downloads in reception order
    pub downloads: Vec<(u16, u8, [u8; 4])>,
    /// current value of each entry, as uploads return it
    pub values: HashMap<(u16, u8), [u8; 4]>,
    pub last_out: Option<PdoOut>,
    /// number of PDO frames received
    pub frames: usize,
    pub state: Option<DriveState>,
}

/**
    drive listening on the loopback interface, with an SDO server on TCP and a PDO peer on UDP

    it starts in [DriveState::Fault] and follows the control words it receives
*/
pub struct LoopbackDrive {
    pub sdo_port: u16,
    pub pdo_port: u16,
    pub record: Arc<Mutex<DriveRecord>>,
}
impl LoopbackDrive {
    pub async fn start(stuck_in_fault: bool) -> Self {
        let record = Arc::new(Mutex::new(DriveRecord::default()));
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let pdo = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let drive = Self {
            sdo_port: listener.local_addr().unwrap().port(),
            pdo_port: pdo.local_addr().unwrap().port(),
            record: record.clone(),
        };
        tokio::spawn(serve_sdo(listener, record.clone()));
        tokio::spawn(serve_pdo(pdo, record, stuck_in_fault));
        drive
    }
    pub fn downloads(&self) -> Vec<(u16, u8, [u8; 4])> {
        self.record.lock().unwrap().downloads.clone()
    }
    pub fn frames(&self) -> usize {
        self.record.lock().unwrap().frames
    }
    pub fn last_out(&self) -> Option<PdoOut> {
        self.record.lock().unwrap().last_out
    }
}

async fn serve_sdo(listener: TcpListener, record: Arc<Mutex<DriveRecord>>) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await
            else {return};
        let record = record.clone();
        tokio::spawn(async move {
            let mut request = [0; SDO_FRAME_SIZE];
            while stream.read_exact(&mut request).await.is_ok() {
                let frame = SdoFrame::from_bytes(&request);
                let value = {
                    let mut record = record.lock().unwrap();
                    if frame.header.command().value() == 1 {
                        record.downloads.push((frame.index, frame.sub, frame.value));
                        record.values.insert((frame.index, frame.sub), frame.value);
                    }
                    record.values.get(&(frame.index, frame.sub)).copied().unwrap_or_default()
                };
                if stream.write_all(&acknowledge(&request, value)).await.is_err()
                    {return}
            }
        });
    }
}

async fn serve_pdo(socket: UdpSocket, record: Arc<Mutex<DriveRecord>>, stuck_in_fault: bool) {
    let mut state = DriveState::Fault;
    let mut buffer = [0; 64];
    loop {
        let Ok((size, master)) = socket.recv_from(&mut buffer).await
            else {return};
        let Ok(out) = PdoOut::unpack(&buffer[.. size])
            else {continue};
        state = react(state, u16::from(out.control_word), stuck_in_fault);
        {
            let mut record = record.lock().unwrap();
            record.last_out = Some(out);
            record.frames += 1;
            record.state = Some(state);
        }
        let input = PdoIn {
            status_word: status_of(state).into(),
            operation_mode_display: u8::from(out.operation_mode),
            actual_position: out.target_position,
            actual_velocity: out.target_velocity,
            .. PdoIn::default()
        };
        let mut frame = [0; PdoIn::LEN];
        input.pack(&mut frame).unwrap();
        let _ = socket.send_to(&frame, master).await;
    }
}

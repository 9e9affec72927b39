/*!
    cyclic exchange of process data with a drive

    A background task sends [PdoOut] and receives [PdoIn] every period. The application never waits for the network: it writes targets into the output frame, reads the last received input frame, and picks up the errors the background task met when it wants to.

    ```text
    application task                background task (every cycle_period)
      set_velocity ──> [PdoOut] ──> pack, send
                                    receive (at most one period)
      status_word  <── [mailbox] <── unpack, post (frame, result)
      check_for_exception <─┘       notify waiters
    ```
*/

use std::sync::{Arc, Mutex, MutexGuard, atomic::{AtomicBool, Ordering}};
use core::{pin::pin, time::Duration};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
    };
use crate::{
    socket::{self, CoeSocket},
    pdo::{PdoIn, PdoOut},
    cia402::{decode_status, DriveState, OperationMode, Transition},
    data::PduData,
    error::{AxisError, AxisResult},
    };


/// receive buffer, larger than a frame so that oversized frames are detected
const PDO_RECEIVE_SIZE: usize = 64;

/**
    cyclic PDO exchange with one drive

    Every method takes `&self`, so the session can be shared and closed from an other task while a transition is being waited for.
*/
pub struct PdoSession<S> {
    exchange: Arc<Exchange<S>>,
    task: Mutex<Option<JoinHandle<()>>>,
}
/// state shared with the background task
struct Exchange<S> {
    socket: S,
    period: Duration,
    /// frame sent at next cycle, written by the application
    output: Mutex<PdoOut>,
    /// result of the last cycles, written by the background task
    mailbox: Mutex<Mailbox>,
    /// signaled at the end of each cycle and on close
    cycle: Notify,
    closed: AtomicBool,
}
/// single-slot mailbox between the background task and the application
struct Mailbox {
    input: PdoIn,
    /// last error not yet picked up by the application
    error: Option<AxisError>,
    /// number of cycles done
    cycles: u64,
}

impl<S: CoeSocket + Send + Sync + 'static> PdoSession<S> {
    /// start exchanging with the default output frame, the drive is not commanded anything until the control word is set
    pub fn new(socket: S, period: Duration) -> Self {
        let exchange = Arc::new(Exchange {
            socket,
            period,
            output: Mutex::new(PdoOut::default()),
            mailbox: Mutex::new(Mailbox {
                input: PdoIn::default(),
                error: None,
                cycles: 0,
            }),
            cycle: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let task = tokio::spawn(exchange.clone().run());
        Self {
            exchange,
            task: Mutex::new(Some(task)),
        }
    }
}

impl<S> PdoSession<S> {
    /// last status word received, never waits
    pub fn status_word(&self) -> u16 {
        u16::from(self.exchange.mailbox().input.status_word)
    }
    /// drive state decoded from the last status word
    pub fn state(&self) -> DriveState {
        decode_status(self.status_word())
    }
    /// copy of the last frame received
    pub fn input(&self) -> PdoIn {
        self.exchange.mailbox().input
    }
    /// copy of the frame to send at next cycle
    pub fn output(&self) -> PdoOut {
        *self.exchange.output()
    }
    /// number of cycles done since the session started
    pub fn cycles(&self) -> u64 {
        self.exchange.mailbox().cycles
    }

    pub fn set_velocity(&self, velocity: i32) {
        self.exchange.output().target_velocity = velocity;
    }
    pub fn set_position(&self, position: i32) {
        self.exchange.output().target_position = position;
    }
    pub fn set_torque(&self, torque: i16) {
        self.exchange.output().target_torque = torque;
    }
    pub fn set_operation_mode(&self, mode: OperationMode) {
        self.exchange.output().operation_mode = mode;
    }
    pub fn set_control_word(&self, word: u16) {
        self.exchange.output().control_word = word.into();
    }

    /**
        return the error met by the background exchange since the last call, if any

        Only the last error is kept, older ones are overwritten. A closed session always reports [AxisError::Closed].
    */
    pub fn check_for_exception(&self) -> AxisResult {
        if let Some(error) = self.exchange.mailbox().error.take()
            {return Err(error)}
        if self.exchange.closed.load(Ordering::Acquire)
            {return Err(AxisError::Closed)}
        Ok(())
    }

    /**
        request a transition of the drive state machine and wait for the drive to report it done

        The state is checked once per cycle, there is no other polling. The wait fails when the deadline expires, when the background exchange reports an error, or when the session is closed meanwhile.

        Returns the state that satisfied the transition.
    */
    pub async fn request_transition_and_wait(&self, transition: Transition, timeout: Duration) -> AxisResult<DriveState> {
        let deadline = Deadline::new(timeout, transition.label());
        let control = transition.control_word();
        log::debug!("requesting {}: {}", transition.label(), control);
        self.exchange.output().control_word = control;

        loop {
            // subscribe before checking, so a cycle ending in between is not missed
            let mut cycle = pin!(self.exchange.cycle.notified());
            cycle.as_mut().enable();

            self.check_for_exception()?;
            let state = self.state();
            if transition.accepts(state) {
                log::debug!("{} done in {:?}, drive {:?}", transition.label(), deadline.elapsed(), state);
                return Ok(state);
            }
            if tokio::time::timeout(deadline.remaining(), cycle).await.is_err()
                {return Err(deadline.expired(self.state()))}
        }
    }

    /**
        stop the background exchange and release the socket

        Anyone waiting on this session is woken up and gets [AxisError::Closed]. Closing twice is harmless.
    */
    pub fn close(&self) {
        if self.exchange.closed.swap(true, Ordering::AcqRel)
            {return}
        if let Some(task) = self.exchange_task().take()
            {task.abort()}
        self.exchange.cycle.notify_waiters();
        log::debug!("PDO session closed");
    }

    fn exchange_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S> Drop for PdoSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S> Exchange<S> {
    // locks are never held across an await or a blocking call, so a panic while holding them leaves consistent data
    fn output(&self) -> MutexGuard<'_, PdoOut> {
        self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
    fn mailbox(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: CoeSocket> Exchange<S> {
    /// background loop, runs until the task is aborted
    async fn run(self: Arc<Self>) {
        let mut period = tokio::time::interval(self.period);
        period.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = [0; PDO_RECEIVE_SIZE];

        while ! self.closed.load(Ordering::Acquire) {
            period.tick().await;
            let result = self.exchange(&mut buffer).await;

            {
                let mut mailbox = self.mailbox();
                mailbox.cycles += 1;
                match result {
                    Ok(Some(input)) => mailbox.input = input,
                    Ok(None) => {},
                    Err(error) => {
                        log::warn!("PDO exchange with {} failed: {}", self.socket.peer(), error);
                        mailbox.error = Some(error);
                    },
                }
            }
            self.cycle.notify_waiters();
        }
    }

    /// one cycle: send the output frame, then receive an input frame if one comes in time
    async fn exchange(&self, buffer: &mut [u8]) -> AxisResult<Option<PdoIn>> {
        let mut frame = [0; PdoOut::LEN];
        let output = *self.output();
        output.pack(&mut frame)?;
        socket::send(&self.socket, &frame).await?;

        let received = match tokio::time::timeout(self.period, socket::receive(&self.socket, buffer)).await {
            Ok(received) => received?,
            Err(_) => {
                // the next cycle supersedes the lost frame
                log::trace!("no PDO frame from {} this cycle", self.socket.peer());
                return Ok(None)
            },
        };
        if received != PdoIn::LEN
            {return Err(AxisError::Protocol("PDO frame has wrong size"))}
        Ok(Some(PdoIn::unpack(&buffer[.. received])?))
    }
}


/**
    time limit of a wait, created when the wait begins

    It is never reset: each wait gets its own deadline.
*/
#[derive(Copy, Clone, Debug)]
pub struct Deadline {
    start: Instant,
    max: Duration,
    label: &'static str,
}
impl Deadline {
    pub fn new(max: Duration, label: &'static str) -> Self {
        Self {start: Instant::now(), max, label}
    }
    pub fn label(&self) -> &'static str {self.label}
    pub fn elapsed(&self) -> Duration {self.start.elapsed()}
    /// time left before expiration, zero once expired
    pub fn remaining(&self) -> Duration {
        self.max.saturating_sub(self.start.elapsed())
    }
    /// error reporting this deadline expired while the drive was in the given state
    pub fn expired(&self, last: DriveState) -> AxisError {
        AxisError::Timeout {
            transition: self.label,
            last,
        }
    }
}

/*!
    bring-up and control of one servo axis

    An [Axis] owns the two channels to its drive. Creating it does the whole bring-up:

    1. the object dictionary is downloaded through a short lived SDO stream
    2. the PDO exchange starts cyclically
    3. the drive state machine is walked up to [DriveState::OperationEnabled]

    Once created, the axis only takes targets. They are written in the next cycle frame and never wait for the network.

    ```ignore
    let context = AxisContext::new(
        NodeLocatorCache::new(StaticLocator(vec![NodePorts::new(address, 5000, 5001)])),
        Arc::new(dictionary),
        );
    let mut axis = Axis::new(address, "csp", &context).await?;
    axis.set_position(1000)?;
    ```
*/

use std::{
    net::IpAddr,
    sync::Arc,
    };
use log::Level;
use crate::{
    socket::{TcpSocket, UdpSocket},
    can::Can,
    sdo::{DictionaryProvider, ObjectDictionary, SdoValue},
    pdo::{PdoIn, PdoOut},
    cia402::{DriveState, OperationMode, Transition},
    cyclic::PdoSession,
    locator::{NodeLocatorCache, NodePorts},
    printer::{Printer, LogPrinter},
    config::AxisConfig,
    error::{AxisError, AxisResult},
    };


/// how far the bring-up went, each stage is reached once the previous step succeeded
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum BringUp {
    Idle,
    /// the dictionary is in the drive
    SdoPushed,
    /// the drive is in [DriveState::SwitchOnDisabled]
    FaultReset,
    /// the drive is in [DriveState::ReadyToSwitchOn]
    ShutdownRequested,
    /// the drive is in [DriveState::SwitchedOn] or further
    SwitchOnRequested,
    /// the drive follows the targets
    OperationEnabled,
}

/**
    everything the axes of one application share

    It is cheap to clone, the collaborators are behind [Arc]s.
*/
#[derive(Clone)]
pub struct AxisContext {
    pub nodes: Arc<NodeLocatorCache>,
    pub dictionaries: Arc<dyn DictionaryProvider>,
    /// sink for operator lines, `None` gives each axis a [LogPrinter] named after its address
    pub printer: Option<Arc<dyn Printer>>,
    pub config: AxisConfig,
}
impl AxisContext {
    pub fn new(nodes: Arc<NodeLocatorCache>, dictionaries: Arc<dyn DictionaryProvider>) -> Self {
        Self {
            nodes,
            dictionaries,
            printer: None,
            config: AxisConfig::default(),
        }
    }
    pub fn with_config(self, config: AxisConfig) -> Self {
        Self {config, ..self}
    }
    pub fn with_printer(self, printer: Arc<dyn Printer>) -> Self {
        Self {printer: Some(printer), ..self}
    }
}

/// one drive brought up and cyclically controlled
pub struct Axis {
    address: IpAddr,
    ports: NodePorts,
    mode: OperationMode,
    dictionary: ObjectDictionary,
    config: AxisConfig,
    printer: Arc<dyn Printer>,
    pdo: PdoSession<UdpSocket>,
    stage: BringUp,
}

impl Axis {
    /**
        bring up the drive at the given address in the given operation mode (`"csp"`, `"csv"` or `"cst"`)

        Bad settings are reported as [AxisError::Config] before anything is sent. If the state machine cannot be walked up, the PDO exchange is stopped before the error is returned.
    */
    pub async fn new(address: IpAddr, mode: &str, context: &AxisContext) -> AxisResult<Self> {
        let mode: OperationMode = mode.parse()?;
        let dictionary = context.dictionaries.dictionary(address)
            .ok_or_else(|| AxisError::Config(format!("no object dictionary for {}", address)))?;
        let printer = context.printer.clone()
            .unwrap_or_else(|| Arc::new(LogPrinter::new(address.to_string())));
        let config = context.config.clone();
        let ports = context.nodes.resolve(address).await?;

        printer.print(Level::Info, format_args!(
            "bringing up {:?} axis, SDO port {}, PDO port {}", mode, ports.sdo_port, ports.pdo_port));

        let mut sdo = Can::new(TcpSocket::connect(ports.sdo()).await?, &config, printer.clone());
        sdo.download_all(&dictionary).await?;
        sdo.close();
        let stage = BringUp::SdoPushed;
        // the drive refuses the PDO channel until its SDO side is torn down
        tokio::time::sleep(config.reopen_pause).await;

        let pdo = PdoSession::new(UdpSocket::connect(ports.pdo()).await?, config.cycle_period);
        pdo.set_operation_mode(mode);

        let mut axis = Self {address, ports, mode, dictionary, config, printer, pdo, stage};
        if let Err(error) = axis.enable().await {
            axis.printer.print(Level::Error, format_args!("bring-up failed at {:?}: {}", axis.stage, error));
            axis.pdo.close();
            return Err(error);
        }
        axis.printer.print(Level::Info, format_args!("operation enabled"));
        Ok(axis)
    }

    /// walk the state machine from any state to operation enabled
    async fn enable(&mut self) -> AxisResult {
        for (transition, stage) in [
                (Transition::ResetFault, BringUp::FaultReset),
                (Transition::Shutdown, BringUp::ShutdownRequested),
                (Transition::SwitchOn, BringUp::SwitchOnRequested),
                (Transition::EnableOperation, BringUp::OperationEnabled),
                ] {
            let state = self.pdo.request_transition_and_wait(transition, self.config.transition_timeout).await?;
            self.printer.print(Level::Debug, format_args!("{} done, drive {:?}", transition.label(), state));
            self.stage = stage;
        }
        Ok(())
    }

    pub fn address(&self) -> IpAddr {self.address}
    pub fn ports(&self) -> NodePorts {self.ports}
    pub fn mode(&self) -> OperationMode {self.mode}
    pub fn stage(&self) -> BringUp {self.stage}
    /// state decoded from the last status word received
    pub fn state(&self) -> DriveState {self.pdo.state()}
    /// the dictionary as it is now, including the overrides not yet downloaded
    pub fn dictionary(&self) -> &ObjectDictionary {&self.dictionary}

    /// velocity target, sent at next cycle
    pub fn set_velocity(&self, velocity: i32) -> AxisResult {
        self.pdo.check_for_exception()?;
        self.pdo.set_velocity(velocity);
        Ok(())
    }
    /// position target, sent at next cycle
    pub fn set_position(&self, position: i32) -> AxisResult {
        self.pdo.check_for_exception()?;
        self.pdo.set_position(position);
        Ok(())
    }
    /// torque target, sent at next cycle
    pub fn set_torque(&self, torque: i16) -> AxisResult {
        self.pdo.check_for_exception()?;
        self.pdo.set_torque(torque);
        Ok(())
    }

    /// last frame received from the drive
    pub fn get_pdo_in(&self) -> PdoIn {self.pdo.input()}
    /// frame sent to the drive at next cycle
    pub fn get_pdo_out(&self) -> PdoOut {self.pdo.output()}

    /**
        change the value of a dictionary entry, nothing is sent to the drive

        Entries missing from the dictionary are left missing, see [ObjectDictionary::set_entry]. Use [Self::download_sdo_entry] to send the new value.
    */
    pub fn set_sdo_entry(&mut self, index: u16, sub: u8, value: SdoValue) {
        self.dictionary.set_entry(index, sub, value);
    }

    /**
        read an entry from the drive through a new SDO stream

        The value gets the type of the matching dictionary entry, and is read as an integer when the dictionary has no such entry.
    */
    pub async fn upload_sdo_entry(&self, index: u16, sub: u8) -> AxisResult<SdoValue> {
        let mut sdo = self.sdo().await?;
        let reply = sdo.upload(index, sub).await;
        sdo.close();
        let reply = reply?;
        Ok(match self.dictionary.get(index, sub) {
            Some(entry) => entry.value.same_type(reply.value),
            None => SdoValue::Int32(reply.as_i32()),
        })
    }

    /// send the current dictionary value of an entry through a new SDO stream
    pub async fn download_sdo_entry(&self, index: u16, sub: u8) -> AxisResult {
        let entry = *self.dictionary.get(index, sub)
            .ok_or_else(|| AxisError::Config(format!("no dictionary entry {:#06x}:{:02x}", index, sub)))?;
        let mut sdo = self.sdo().await?;
        let result = sdo.download(&entry).await;
        sdo.close();
        result.map(|_| ())
    }

    /**
        cut the drive power stage off, the drive stops following the targets

        The PDO exchange keeps running, so the drive can be brought up again by creating a new axis once this one is closed.
    */
    pub async fn disable(&mut self) -> AxisResult<DriveState> {
        let state = self.pdo.request_transition_and_wait(Transition::DisableVoltage, self.config.transition_timeout).await?;
        self.stage = self.stage.min(BringUp::FaultReset);
        self.printer.print(Level::Info, format_args!("disabled, drive {:?}", state));
        Ok(state)
    }

    /// stop the PDO exchange, the drive will trigger its own communication watchdog
    pub fn close(&self) {
        self.pdo.close();
        self.printer.print(Level::Info, format_args!("closed"));
    }

    async fn sdo(&self) -> AxisResult<Can<TcpSocket>> {
        Ok(Can::new(TcpSocket::connect(self.ports.sdo()).await?, &self.config, self.printer.clone()))
    }
}

//! Scripted protocol clients for tests.
//!
//! The mocks answer from queues set up by the test and record every call in a
//! shared [`CallLog`], so the log stays inspectable after the mock has been
//! moved into a board driver or dropped by the autodetector.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::{
    autopilot, AnalogReading, BatteryConfig, Connector, Heartbeat, MavlinkLink, MspLink,
    ProtocolError, ProtocolResult, SysStatus,
};

/// Shared, append-only record of calls made on a mock.
pub type CallLog<C> = Rc<RefCell<Vec<C>>>;

/// Hook invoked after each telemetry sample with the running sample count.
pub type SampleHook = Box<dyn FnMut(usize)>;

/// One scripted response.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted<T> {
    Reply(T),
    Timeout,
    SyncLost,
}

/// Response queue where the last entry repeats forever.
#[derive(Debug, Clone)]
struct ReplyQueue<T> {
    entries: VecDeque<Scripted<T>>,
}

impl<T: Clone> ReplyQueue<T> {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    fn push(&mut self, entry: Scripted<T>) {
        self.entries.push_back(entry);
    }

    fn next(&mut self, what: &'static str) -> ProtocolResult<T> {
        let entry = if self.entries.len() > 1 {
            self.entries.pop_front()
        } else {
            self.entries.front().cloned()
        };
        match entry {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::SyncLost) => Err(ProtocolError::SyncLost(format!("garbled {what}"))),
            Some(Scripted::Timeout) | None => Err(ProtocolError::Timeout(what)),
        }
    }
}

// ==================== MAVLink ====================

#[derive(Debug, Clone, PartialEq)]
pub enum MavlinkCall {
    WaitHeartbeat,
    ParamGet(String),
    ParamSet(String, f32),
    SetMessageInterval(u32, f32),
    WaitSysStatus,
    Reboot,
}

/// Scripted ArduPilot-style autopilot.
pub struct MockMavlink {
    params: HashMap<String, f32>,
    params_locked: Rc<Cell<bool>>,
    heartbeats: ReplyQueue<Heartbeat>,
    sys_status: ReplyQueue<SysStatus>,
    samples_served: usize,
    sample_hook: Option<SampleHook>,
    calls: CallLog<MavlinkCall>,
}

impl MockMavlink {
    /// Autopilot that answers heartbeats as ArduPilot and has no parameters.
    pub fn new() -> Self {
        let mut heartbeats = ReplyQueue::new();
        heartbeats.push(Scripted::Reply(Self::ardupilot_heartbeat()));
        Self {
            params: HashMap::new(),
            params_locked: Rc::new(Cell::new(false)),
            heartbeats,
            sys_status: ReplyQueue::new(),
            samples_served: 0,
            sample_hook: None,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Autopilot that never answers a heartbeat.
    pub fn silent() -> Self {
        let mut mock = Self::new();
        mock.heartbeats = ReplyQueue::new();
        mock.heartbeats.push(Scripted::Timeout);
        mock
    }

    pub fn ardupilot_heartbeat() -> Heartbeat {
        Heartbeat {
            autopilot: autopilot::ARDUPILOTMEGA,
            vehicle_type: 2,
            system_id: 1,
            component_id: 1,
        }
    }

    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Replace the heartbeat script.
    pub fn with_heartbeats(mut self, replies: Vec<Scripted<Heartbeat>>) -> Self {
        self.heartbeats = ReplyQueue::new();
        for reply in replies {
            self.heartbeats.push(reply);
        }
        self
    }

    /// Queue one SYS_STATUS reading; the last queued reading repeats.
    pub fn push_sys_status(&mut self, voltage_mv: u16, current_ca: i16) {
        self.sys_status.push(Scripted::Reply(SysStatus {
            voltage_mv,
            current_ca,
        }));
    }

    pub fn set_sample_hook(&mut self, hook: SampleHook) {
        self.sample_hook = Some(hook);
    }

    /// While the returned flag is set every `PARAM_SET` is rejected.
    pub fn param_lock(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.params_locked)
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params.get(name).copied()
    }

    pub fn call_log(&self) -> CallLog<MavlinkCall> {
        Rc::clone(&self.calls)
    }

    fn record(&self, call: MavlinkCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Default for MockMavlink {
    fn default() -> Self {
        Self::new()
    }
}

impl MavlinkLink for MockMavlink {
    fn wait_heartbeat(&mut self, _timeout: Duration) -> ProtocolResult<Heartbeat> {
        self.record(MavlinkCall::WaitHeartbeat);
        self.heartbeats.next("HEARTBEAT")
    }

    fn param_get(&mut self, name: &str) -> ProtocolResult<f32> {
        self.record(MavlinkCall::ParamGet(name.to_string()));
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::Rejected(format!("unknown parameter {name}")))
    }

    fn param_set(&mut self, name: &str, value: f32) -> ProtocolResult<()> {
        self.record(MavlinkCall::ParamSet(name.to_string(), value));
        if !self.params.contains_key(name) {
            return Err(ProtocolError::Rejected(format!("unknown parameter {name}")));
        }
        if self.params_locked.get() {
            return Err(ProtocolError::Rejected(format!("{name} is read-only")));
        }
        self.params.insert(name.to_string(), value);
        Ok(())
    }

    fn set_message_interval(&mut self, message_id: u32, rate_hz: f32) -> ProtocolResult<()> {
        self.record(MavlinkCall::SetMessageInterval(message_id, rate_hz));
        Ok(())
    }

    fn wait_sys_status(&mut self) -> ProtocolResult<SysStatus> {
        self.record(MavlinkCall::WaitSysStatus);
        let status = self.sys_status.next("SYS_STATUS")?;
        self.samples_served += 1;
        if let Some(hook) = self.sample_hook.as_mut() {
            hook(self.samples_served);
        }
        Ok(status)
    }

    fn reboot(&mut self) -> ProtocolResult<()> {
        self.record(MavlinkCall::Reboot);
        Ok(())
    }
}

// ==================== MSP ====================

#[derive(Debug, Clone, PartialEq)]
pub enum MspCall {
    FcVariant,
    BatteryConfig,
    SetBatteryConfig(BatteryConfig),
    Features,
    SetFeatures(u32),
    Analog,
    EepromWrite,
    Reboot,
}

/// Scripted iNav-style flight controller.
pub struct MockMsp {
    variants: ReplyQueue<[u8; 4]>,
    battery: BatteryConfig,
    features: u32,
    analog: ReplyQueue<AnalogReading>,
    samples_served: usize,
    sample_hook: Option<SampleHook>,
    calls: CallLog<MspCall>,
}

impl MockMsp {
    /// Flight controller answering `FC_VARIANT` with `variant`.
    pub fn new(variant: [u8; 4]) -> Self {
        let mut variants = ReplyQueue::new();
        variants.push(Scripted::Reply(variant));
        Self {
            variants,
            battery: BatteryConfig::default(),
            features: 0,
            analog: ReplyQueue::new(),
            samples_served: 0,
            sample_hook: None,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Port that never answers MSP.
    pub fn silent() -> Self {
        Self::scripted(vec![Scripted::Timeout])
    }

    /// Replace the `FC_VARIANT` script.
    pub fn scripted(replies: Vec<Scripted<[u8; 4]>>) -> Self {
        let mut mock = Self::new(*b"????");
        mock.variants = ReplyQueue::new();
        for reply in replies {
            mock.variants.push(reply);
        }
        mock
    }

    pub fn with_battery_config(mut self, config: BatteryConfig) -> Self {
        self.battery = config;
        self
    }

    pub fn with_features(mut self, mask: u32) -> Self {
        self.features = mask;
        self
    }

    /// Queue one analog reading; the last queued reading repeats.
    pub fn push_analog(&mut self, voltage: f64, current: f64) {
        self.analog
            .push(Scripted::Reply(AnalogReading { voltage, current }));
    }

    pub fn set_sample_hook(&mut self, hook: SampleHook) {
        self.sample_hook = Some(hook);
    }

    pub fn battery(&self) -> &BatteryConfig {
        &self.battery
    }

    pub fn feature_mask(&self) -> u32 {
        self.features
    }

    pub fn call_log(&self) -> CallLog<MspCall> {
        Rc::clone(&self.calls)
    }

    fn record(&self, call: MspCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl MspLink for MockMsp {
    fn fc_variant(&mut self) -> ProtocolResult<[u8; 4]> {
        self.record(MspCall::FcVariant);
        self.variants.next("MSP_FC_VARIANT")
    }

    fn battery_config(&mut self) -> ProtocolResult<BatteryConfig> {
        self.record(MspCall::BatteryConfig);
        Ok(self.battery)
    }

    fn set_battery_config(&mut self, config: &BatteryConfig) -> ProtocolResult<()> {
        self.record(MspCall::SetBatteryConfig(*config));
        self.battery = *config;
        Ok(())
    }

    fn features(&mut self) -> ProtocolResult<u32> {
        self.record(MspCall::Features);
        Ok(self.features)
    }

    fn set_features(&mut self, mask: u32) -> ProtocolResult<()> {
        self.record(MspCall::SetFeatures(mask));
        self.features = mask;
        Ok(())
    }

    fn analog(&mut self) -> ProtocolResult<AnalogReading> {
        self.record(MspCall::Analog);
        let reading = self.analog.next("MSP2_INAV_ANALOG")?;
        self.samples_served += 1;
        if let Some(hook) = self.sample_hook.as_mut() {
            hook(self.samples_served);
        }
        Ok(reading)
    }

    fn eeprom_write(&mut self) -> ProtocolResult<()> {
        self.record(MspCall::EepromWrite);
        Ok(())
    }

    fn reboot(&mut self) -> ProtocolResult<()> {
        self.record(MspCall::Reboot);
        Ok(())
    }
}

// ==================== Connector ====================

/// Connector handing out one pre-built mock per protocol.
pub struct MockConnector {
    msp: Option<MockMsp>,
    mavlink: Option<MockMavlink>,
    opened: Vec<&'static str>,
}

impl MockConnector {
    pub fn new(msp: MockMsp, mavlink: MockMavlink) -> Self {
        Self {
            msp: Some(msp),
            mavlink: Some(mavlink),
            opened: Vec::new(),
        }
    }

    /// Protocol clients opened so far, in order.
    pub fn opened(&self) -> &[&'static str] {
        &self.opened
    }

    fn port_gone(protocol: &str) -> ProtocolError {
        ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{protocol} client already opened"),
        ))
    }
}

impl Connector for MockConnector {
    type Msp = MockMsp;
    type Mavlink = MockMavlink;

    fn open_msp(&mut self) -> ProtocolResult<MockMsp> {
        self.opened.push("msp");
        self.msp.take().ok_or_else(|| Self::port_gone("MSP"))
    }

    fn open_mavlink(&mut self) -> ProtocolResult<MockMavlink> {
        self.opened.push("mavlink");
        self.mavlink.take().ok_or_else(|| Self::port_gone("MAVLink"))
    }
}

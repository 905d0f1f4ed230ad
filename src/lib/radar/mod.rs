use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::brand::navico::{LineFormat, Model};
use crate::settings::Controls;

pub mod spoke;

use spoke::Spoke;

pub type SpokeBearing = u16;

// Receivers that fall this far behind lose the oldest messages
const SPOKE_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("Interface '{0}' is not available")]
    InterfaceNotFound(String),
    #[error("Cannot detect Ethernet devices")]
    EnumerationFailed,
    #[error("Shutdown")]
    Shutdown,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Power {
    #[default]
    Off,
    Standby,
    WakingUp,
    Transmit,
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Monotonic counters, only ever reset on explicit request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub packets: u64,
    pub spokes: u64,
    pub missing_spokes: u64,
    pub broken_packets: u64,
    pub broken_lines: u64,
    pub unknown_reports: u64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} packets ({} broken), {} spokes ({} missing, {} broken), {} unknown reports",
            self.packets,
            self.broken_packets,
            self.spokes,
            self.missing_spokes,
            self.broken_lines,
            self.unknown_reports
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct GeoPosition {
    lat: f64,
    lon: f64,
}

impl GeoPosition {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPosition { lat, lon }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Notifications for whoever displays the radar picture.
#[derive(Clone, Debug, PartialEq)]
pub enum RadarEvent {
    /// A radar answered on this interface
    Detected {
        nic_addr: Ipv4Addr,
        radar_addr: SocketAddrV4,
    },
    /// Radar went silent, state is back to off
    Lost,
    /// No spokes for a while, whatever is on screen is stale
    ResetImage,
    StatusChanged(String),
}

impl fmt::Display for RadarEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RadarEvent::Detected {
                nic_addr,
                radar_addr,
            } => write!(f, "radar detected at {} via {}", radar_addr, nic_addr),
            RadarEvent::Lost => write!(f, "radar lost"),
            RadarEvent::ResetImage => write!(f, "no spokes, image reset"),
            RadarEvent::StatusChanged(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarState {
    pub name: String,
    pub power: Power,
    pub status: String,
    pub model: Model,
    pub line_format: Option<LineFormat>,
    pub build_info: Option<String>,
    pub nic_addr: Option<Ipv4Addr>,
    pub radar_addr: Option<SocketAddrV4>,
    pub controls: Controls,
    pub statistics: Statistics,
}

/// The state of one radar, written by its receive loop and readable by
/// anybody holding a clone.
#[derive(Clone, Debug)]
pub struct SharedRadarState {
    inner: Arc<RwLock<RadarState>>,
    spoke_tx: broadcast::Sender<Vec<Spoke>>,
    event_tx: broadcast::Sender<RadarEvent>,
}

impl SharedRadarState {
    pub fn new(name: &str) -> SharedRadarState {
        let state = RadarState {
            name: name.to_string(),
            status: "Off".to_string(),
            ..Default::default()
        };
        let (spoke_tx, _) = broadcast::channel(SPOKE_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        SharedRadarState {
            inner: Arc::new(RwLock::new(state)),
            spoke_tx,
            event_tx,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RadarState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RadarState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RadarState {
        self.read().clone()
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn power(&self) -> Power {
        self.read().power
    }

    pub fn status(&self) -> String {
        self.read().status.clone()
    }

    pub fn model(&self) -> Model {
        self.read().model
    }

    pub fn build_info(&self) -> Option<String> {
        self.read().build_info.clone()
    }

    pub fn radar_addr(&self) -> Option<SocketAddrV4> {
        self.read().radar_addr
    }

    pub fn controls(&self) -> Controls {
        self.read().controls.clone()
    }

    pub fn statistics(&self) -> Statistics {
        self.read().statistics
    }

    pub fn reset_statistics(&self) {
        let mut state = self.write();
        log::debug!("{}: statistics reset, were {}", state.name, state.statistics);
        state.statistics = Statistics::default();
    }

    /// Every frame that produced spokes is sent as one message
    pub fn subscribe_spokes(&self) -> broadcast::Receiver<Vec<Spoke>> {
        self.spoke_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RadarEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn send_spokes(&self, spokes: Vec<Spoke>) {
        // Nobody listening is fine
        let _ = self.spoke_tx.send(spokes);
    }

    pub(crate) fn notify(&self, event: RadarEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn set_status(&self, status: String) {
        {
            let mut state = self.write();
            if state.status == status {
                return;
            }
            log::debug!("{}: status '{}'", state.name, status);
            state.status = status.clone();
        }
        self.notify(RadarEvent::StatusChanged(status));
    }

    /// Returns true when the power state changed
    pub(crate) fn set_power(&self, power: Power) -> bool {
        let mut state = self.write();
        if state.power == power {
            return false;
        }
        log::debug!("{}: power {} -> {}", state.name, state.power, power);
        state.power = power;
        true
    }

    /// A radar answered on `nic_addr`; an idle radar is at least in standby.
    pub(crate) fn detected(&self, nic_addr: Ipv4Addr, radar_addr: SocketAddrV4) {
        {
            let mut state = self.write();
            state.nic_addr = Some(nic_addr);
            state.radar_addr = Some(radar_addr);
            if state.power == Power::Off {
                state.power = Power::Standby;
            }
            log::info!(
                "{}: detected radar at {} via {}, {}",
                state.name,
                radar_addr,
                nic_addr,
                state.power
            );
        }
        self.notify(RadarEvent::Detected {
            nic_addr,
            radar_addr,
        });
    }

    pub(crate) fn lost(&self) {
        {
            let mut state = self.write();
            log::info!("{}: lost radar at {:?}", state.name, state.radar_addr);
            state.power = Power::Off;
            state.nic_addr = None;
            state.radar_addr = None;
        }
        self.notify(RadarEvent::Lost);
    }
}

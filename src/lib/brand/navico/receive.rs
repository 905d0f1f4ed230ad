use log::{debug, error, info, trace, warn};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

use crate::navdata::Navigation;
use crate::network::interface::InterfaceSelector;
use crate::network::{create_udp_multicast_listen, create_wake_pair};
use crate::radar::{Power, RadarError, RadarEvent, SharedRadarState};

use super::data::FrameDecoder;
use super::report::ReportProcessor;
use super::{FRAME_HEADER_LENGTH, MAX_SPOKES_PER_FRAME, RADAR_LINE_LENGTH, RadarProfile};

const MILLIS_PER_SELECT: u64 = 250;

const fn seconds_select(seconds: i32) -> i32 {
    seconds * 1000 / MILLIS_PER_SELECT as i32
}

// The watchdogs count idle ticks up to this value
const WATCHDOG_TIMEOUT: i32 = seconds_select(2);
// and start from these (below zero) after traffic, which buys extra time
const DATA_GRACE_AFTER_FRAME: i32 = -15;
const SPOKE_GRACE_AFTER_FRAME: i32 = -5;
const DATA_GRACE_AFTER_REPORT: i32 = seconds_select(-15);

const MAX_REPORT_LENGTH: usize = 1024;
const MAX_FRAME_LENGTH: usize = FRAME_HEADER_LENGTH + MAX_SPOKES_PER_FRAME * RADAR_LINE_LENGTH;

/// Lets another task stop a running receive loop.
#[derive(Clone, Debug)]
pub struct ReceiverHandle {
    key: String,
    wake: Arc<std::net::UdpSocket>,
    terminated: Arc<AtomicBool>,
}

impl ReceiverHandle {
    /// Ask the receive loop to stop, without waiting for it. Returns false
    /// when the request could not be delivered; the loop is then not
    /// guaranteed to stop, and callers should poll `is_terminated()`.
    pub fn shutdown(&self) -> bool {
        match self.wake.send(b"!") {
            Ok(1) => {
                debug!("{}: requested receive loop to stop", self.key);
                true
            }
            Ok(_) => {
                info!("{}: receive loop will take long time to stop", self.key);
                false
            }
            Err(e) => {
                info!(
                    "{}: receive loop will take long time to stop: {}",
                    self.key, e
                );
                false
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// The receive loop for one radar: finds the interface it lives on, listens
/// for its reports and, once it has answered, for its spoke data.
pub struct NavicoReceiver {
    key: String,
    profile: RadarProfile,
    state: SharedRadarState,
    navigation: Arc<dyn Navigation>,
    selector: InterfaceSelector,
    handle: ReceiverHandle,
    wake_socket: Option<std::net::UdpSocket>,
    report_socket: Option<UdpSocket>,
    data_socket: Option<UdpSocket>,
    report_buf: Vec<u8>,
    data_buf: Vec<u8>,
    nic_addr: Option<Ipv4Addr>,
    radar_addr: Option<SocketAddrV4>,
    no_data_timeout: i32,
    no_spoke_timeout: i32,
    frames: FrameDecoder,
    reports: ReportProcessor,
}

impl NavicoReceiver {
    pub fn new(
        profile: RadarProfile,
        navigation: Arc<dyn Navigation>,
        state: SharedRadarState,
    ) -> Result<NavicoReceiver, RadarError> {
        let key = profile.name.clone();
        let selector =
            InterfaceSelector::new(profile.only_interface.clone(), profile.allow_loopback);
        let (wake_tx, wake_rx) = create_wake_pair()?;

        Ok(NavicoReceiver {
            handle: ReceiverHandle {
                key: key.clone(),
                wake: Arc::new(wake_tx),
                terminated: Arc::new(AtomicBool::new(false)),
            },
            frames: FrameDecoder::new(&key),
            reports: ReportProcessor::new(&key),
            key,
            profile,
            state,
            navigation,
            selector,
            wake_socket: Some(wake_rx),
            report_socket: None,
            data_socket: None,
            report_buf: Vec::with_capacity(MAX_REPORT_LENGTH),
            data_buf: Vec::with_capacity(MAX_FRAME_LENGTH),
            nic_addr: None,
            radar_addr: None,
            no_data_timeout: 0,
            no_spoke_timeout: 0,
        })
    }

    /// Use a different interface selector, for instance one with a fixed
    /// interface list.
    pub fn with_selector(mut self, selector: InterfaceSelector) -> NavicoReceiver {
        self.selector = selector;
        self
    }

    pub fn handle(&self) -> ReceiverHandle {
        self.handle.clone()
    }

    /// Runs until stopped through a `ReceiverHandle`. All sockets are closed
    /// and the handle reports termination before this returns.
    pub async fn run(mut self) -> Result<(), RadarError> {
        debug!("{}: receive loop started", self.key);

        let result = match self.wake_socket.take() {
            Some(socket) => match UdpSocket::from_std(socket) {
                Ok(wake) => self.socket_loop(&wake).await,
                Err(e) => Err(RadarError::Io(e)),
            },
            None => Err(RadarError::Shutdown),
        };

        self.close_sockets();
        self.handle.terminated.store(true, Ordering::Release);
        debug!("{}: receive loop terminated", self.key);
        result
    }

    async fn socket_loop(&mut self, wake: &UdpSocket) -> Result<(), RadarError> {
        let mut wake_buf = [0u8; 16];

        loop {
            self.prepare_sockets();

            tokio::select! { biased;
                r = wake.recv(&mut wake_buf) => {
                    match r {
                        Ok(len) if len > 0 => {
                            debug!("{}: received stop instruction", self.key);
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("{}: wake socket failed: {}", self.key, e);
                            return Err(RadarError::Io(e));
                        }
                    }
                },

                Some(r) = Self::conditional_receive(&self.data_socket, &mut self.data_buf) => {
                    match r {
                        Ok((len, _)) if len > 0 => {
                            let data = mem::take(&mut self.data_buf);
                            self.on_frame(&data);
                            self.data_buf = data;
                        }
                        Ok(_) => {
                            warn!("{}: empty datagram on data socket", self.key);
                            self.data_socket = None;
                        }
                        Err(e) => {
                            warn!("{}: data socket failed: {}", self.key, e);
                            self.data_socket = None;
                        }
                    }
                    self.data_buf.clear();
                },

                Some(r) = Self::conditional_receive(&self.report_socket, &mut self.report_buf) => {
                    match r {
                        Ok((len, SocketAddr::V4(from))) if len > 0 => {
                            let data = mem::take(&mut self.report_buf);
                            self.on_report(&data, from);
                            self.report_buf = data;
                        }
                        Ok((len, from)) if len > 0 => {
                            trace!("{}: ignoring report from {}", self.key, from);
                        }
                        Ok(_) => {
                            warn!("{}: empty datagram on report socket", self.key);
                            self.report_socket = None;
                        }
                        Err(e) => {
                            warn!("{}: report socket failed: {}", self.key, e);
                            self.report_socket = None;
                        }
                    }
                    self.report_buf.clear();
                },

                _ = sleep(Duration::from_millis(MILLIS_PER_SELECT)) => {
                    self.on_idle();
                },
            }

            if self.report_socket.is_none() && self.data_socket.is_some() {
                debug!("{}: no report socket, closing data socket", self.key);
                self.data_socket = None;
            }
        }
    }

    async fn conditional_receive(
        socket: &Option<UdpSocket>,
        buf: &mut Vec<u8>,
    ) -> Option<io::Result<(usize, SocketAddr)>> {
        match socket {
            Some(s) => Some(s.recv_buf_from(buf).await),
            None => None,
        }
    }

    fn prepare_sockets(&mut self) {
        if self.report_socket.is_none() {
            self.start_report_socket();
        }
        if self.radar_addr.is_some() && self.report_socket.is_some() && self.data_socket.is_none()
        {
            self.start_data_socket();
        }
    }

    fn start_report_socket(&mut self) {
        let Some(itf) = self.selector.next_candidate() else {
            self.nic_addr = None;
            return;
        };
        self.nic_addr = Some(itf.addr);

        match create_udp_multicast_listen(&self.profile.report_addr, &itf.addr) {
            Ok(socket) => {
                debug!(
                    "{}: scanning interface {} for reports on {}",
                    self.key, itf, self.profile.report_addr
                );
                self.report_socket = Some(socket);
                self.no_data_timeout = 0;
                self.no_spoke_timeout = 0;
                self.state
                    .set_status(format!("{}: Scanning interface {}", self.key, itf.addr));
            }
            Err(e) => {
                error!(
                    "{}: Unable to listen on {} via {}: {}",
                    self.key, self.profile.report_addr, itf, e
                );
                self.state.set_status(format!(
                    "{}: Unable to listen on interface {}: {}",
                    self.key, itf.addr, e
                ));
            }
        }
    }

    fn start_data_socket(&mut self) {
        let Some(nic_addr) = self.nic_addr else {
            return;
        };

        match create_udp_multicast_listen(&self.profile.data_addr, &nic_addr) {
            Ok(socket) => {
                debug!(
                    "{}: listening for data on {} via {}",
                    self.key, self.profile.data_addr, nic_addr
                );
                self.data_socket = Some(socket);
            }
            Err(e) => {
                error!(
                    "{}: Unable to listen on {} via {}: {}",
                    self.key, self.profile.data_addr, nic_addr, e
                );
                self.state.set_status(format!(
                    "{}: Unable to listen for data on interface {}: {}",
                    self.key, nic_addr, e
                ));
            }
        }
    }

    fn close_sockets(&mut self) {
        if self.data_socket.take().is_some() {
            debug!("{}: closed data socket", self.key);
        }
        if self.report_socket.take().is_some() {
            debug!("{}: closed report socket", self.key);
        }
    }

    fn on_frame(&mut self, data: &[u8]) {
        let spokes = self
            .frames
            .process_frame(data, self.navigation.as_ref(), &self.state);
        if !spokes.is_empty() {
            self.state.send_spokes(spokes);
        }
        self.no_data_timeout = DATA_GRACE_AFTER_FRAME;
        self.no_spoke_timeout = SPOKE_GRACE_AFTER_FRAME;
    }

    fn on_report(&mut self, data: &[u8], from: SocketAddrV4) {
        if !self.reports.process_report(data, &self.state) {
            return;
        }

        if self.radar_addr.is_none() {
            let nic_addr = self.nic_addr.unwrap_or(Ipv4Addr::UNSPECIFIED);
            self.radar_addr = Some(from);
            self.selector.pin();
            self.state.detected(nic_addr, from);
        }
        self.no_data_timeout = DATA_GRACE_AFTER_REPORT;
    }

    /// Called when a whole select period passed without any datagram.
    fn on_idle(&mut self) {
        if self.no_data_timeout >= WATCHDOG_TIMEOUT {
            self.no_data_timeout = 0;
            if self.report_socket.is_some() {
                debug!("{}: no data received, closing report socket", self.key);
                self.report_socket = None;
                self.data_socket = None;
                self.nic_addr = None;
                self.selector.clear();
                if self.radar_addr.take().is_some() {
                    self.state.lost();
                } else {
                    self.state.set_power(Power::Off);
                }
            }
        } else {
            self.no_data_timeout += 1;
        }

        if self.no_spoke_timeout >= WATCHDOG_TIMEOUT {
            self.no_spoke_timeout = 0;
            trace!("{}: no spokes, reset image", self.key);
            self.state.notify(RadarEvent::ResetImage);
        } else {
            self.no_spoke_timeout += 1;
        }
    }
}

//! Round-robin choice of the local interface on which to look for a radar.
//!
//! The receive loop asks for a candidate whenever it has no report socket. Once
//! a radar has answered on the current candidate the selection is pinned and
//! stays put until the loop clears it again.

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::radar::RadarError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub addr: Ipv4Addr,
}

impl fmt::Display for LocalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr)
    }
}

pub type InterfaceSource = Box<dyn FnMut() -> Result<Vec<LocalInterface>, RadarError> + Send>;

pub struct InterfaceSelector {
    only_interface: Option<String>,
    allow_loopback: bool,
    source: InterfaceSource,
    interfaces: Vec<LocalInterface>,
    next: usize,
    current: Option<LocalInterface>,
    pinned: bool,
    reported_missing: bool,
}

impl fmt::Debug for InterfaceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceSelector")
            .field("only_interface", &self.only_interface)
            .field("interfaces", &self.interfaces)
            .field("current", &self.current)
            .field("pinned", &self.pinned)
            .finish()
    }
}

impl InterfaceSelector {
    pub fn new(only_interface: Option<String>, allow_loopback: bool) -> InterfaceSelector {
        InterfaceSelector {
            only_interface,
            allow_loopback,
            source: Box::new(system_interfaces),
            interfaces: Vec::new(),
            next: 0,
            current: None,
            pinned: false,
            reported_missing: false,
        }
    }

    /// Replace the operating system enumeration, mostly useful for tests
    pub fn with_source<F>(mut self, source: F) -> InterfaceSelector
    where
        F: FnMut() -> Result<Vec<LocalInterface>, RadarError> + Send + 'static,
    {
        self.source = Box::new(source);
        self
    }

    /// Advance to the next usable interface.
    ///
    /// Walks the list from the last enumeration; when that is exhausted the
    /// system is enumerated again and the walk restarts at the first usable
    /// entry. Returns `None` when there is nothing usable at all. A pinned
    /// selection is returned unchanged.
    pub fn next_candidate(&mut self) -> Option<LocalInterface> {
        if self.pinned {
            return self.current.clone();
        }

        if self.next >= self.interfaces.len() {
            self.enumerate();
        }

        self.current = self.interfaces.get(self.next).cloned();
        if self.current.is_some() {
            self.next += 1;
        }
        self.current.clone()
    }

    /// Keep the current candidate; a radar was found on it.
    pub fn pin(&mut self) {
        if self.current.is_some() {
            self.pinned = true;
        }
    }

    /// Forget the current candidate, the next call to `next_candidate` moves on.
    pub fn clear(&mut self) {
        self.pinned = false;
        self.current = None;
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    pub fn current(&self) -> Option<&LocalInterface> {
        self.current.as_ref()
    }

    fn enumerate(&mut self) {
        self.next = 0;
        self.interfaces = match (self.source)() {
            Ok(list) => list.into_iter().filter(|itf| self.usable(itf)).collect(),
            Err(e) => {
                log::warn!("{}", e);
                Vec::new()
            }
        };
        log::trace!("Usable interfaces {:?}", self.interfaces);

        if let Some(only_interface) = &self.only_interface {
            if self.interfaces.is_empty() {
                if !self.reported_missing {
                    log::warn!(
                        "{}",
                        RadarError::InterfaceNotFound(only_interface.to_string())
                    );
                    self.reported_missing = true;
                }
            } else {
                self.reported_missing = false;
            }
        }
    }

    fn usable(&self, itf: &LocalInterface) -> bool {
        if let Some(only_interface) = &self.only_interface {
            if &itf.name != only_interface {
                return false;
            }
        }
        if itf.addr.is_unspecified() {
            return false;
        }
        // A loopback is only useful when asked for explicitly
        !itf.addr.is_loopback() || self.allow_loopback || self.only_interface.is_some()
    }
}

fn system_interfaces() -> Result<Vec<LocalInterface>, RadarError> {
    let interfaces = NetworkInterface::show().map_err(|e| {
        log::debug!("getifaddrs() failed: {}", e);
        RadarError::EnumerationFailed
    })?;

    let mut list = Vec::new();
    for itf in interfaces {
        for nic_addr in itf.addr {
            if let IpAddr::V4(addr) = nic_addr.ip() {
                list.push(LocalInterface {
                    name: itf.name.clone(),
                    addr,
                });
            }
        }
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn itf(name: &str, a: u8, b: u8, c: u8, d: u8) -> LocalInterface {
        LocalInterface {
            name: name.to_string(),
            addr: Ipv4Addr::new(a, b, c, d),
        }
    }

    fn three() -> Vec<LocalInterface> {
        vec![
            itf("lo", 127, 0, 0, 1),
            itf("eth0", 192, 168, 1, 10),
            itf("eth1", 10, 56, 0, 1),
            itf("wlan0", 0, 0, 0, 0),
        ]
    }

    #[test]
    fn rotates_over_usable_interfaces() {
        let mut selector = InterfaceSelector::new(None, false).with_source(|| Ok(three()));

        assert_eq!(selector.next_candidate().unwrap().name, "eth0");
        assert_eq!(selector.next_candidate().unwrap().name, "eth1");
        // Exhausted, so enumerated again from the start
        assert_eq!(selector.next_candidate().unwrap().name, "eth0");
    }

    #[test]
    fn enumerates_again_when_list_is_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut selector = InterfaceSelector::new(None, false).with_source(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(vec![itf("eth0", 192, 168, 1, 10)])
        });

        for _ in 0..3 {
            assert_eq!(selector.next_candidate().unwrap().name, "eth0");
        }
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn loopback_only_when_allowed() {
        let mut selector = InterfaceSelector::new(None, true).with_source(|| Ok(three()));
        assert_eq!(selector.next_candidate().unwrap().name, "lo");

        let mut selector =
            InterfaceSelector::new(Some("lo".to_string()), false).with_source(|| Ok(three()));
        assert_eq!(selector.next_candidate().unwrap().name, "lo");
        assert_eq!(selector.next_candidate().unwrap().name, "lo");
    }

    #[test]
    fn restricted_to_single_interface() {
        let mut selector =
            InterfaceSelector::new(Some("eth1".to_string()), false).with_source(|| Ok(three()));

        assert_eq!(
            selector.next_candidate(),
            Some(itf("eth1", 10, 56, 0, 1))
        );
        assert_eq!(
            selector.next_candidate(),
            Some(itf("eth1", 10, 56, 0, 1))
        );
    }

    #[test]
    fn nothing_usable() {
        let mut selector =
            InterfaceSelector::new(Some("eth7".to_string()), false).with_source(|| Ok(three()));
        assert_eq!(selector.next_candidate(), None);
        assert_eq!(selector.current(), None);

        let mut selector = InterfaceSelector::new(None, false)
            .with_source(|| Err(RadarError::EnumerationFailed));
        assert_eq!(selector.next_candidate(), None);
    }

    #[test]
    fn pinned_until_cleared() {
        let mut selector = InterfaceSelector::new(None, false).with_source(|| Ok(three()));

        assert_eq!(selector.next_candidate().unwrap().name, "eth0");
        selector.pin();
        assert!(selector.pinned());
        assert_eq!(selector.next_candidate().unwrap().name, "eth0");
        assert_eq!(selector.next_candidate().unwrap().name, "eth0");

        selector.clear();
        assert!(!selector.pinned());
        assert_eq!(selector.current(), None);
        assert_eq!(selector.next_candidate().unwrap().name, "eth1");
    }

    #[test]
    fn pin_without_candidate_is_ignored() {
        let mut selector = InterfaceSelector::new(None, false).with_source(|| Ok(Vec::new()));
        selector.pin();
        assert!(!selector.pinned());
    }
}

//! Navigation data shared between whoever knows where the boat is and the
//! receive loop that needs heading and position to stamp spokes.

use atomic_float::AtomicF64;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Cli;
use crate::radar::GeoPosition;

/// A heading as reported in the radar's own spoke headers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RadarHeading {
    pub degrees: f64,
    pub is_true: bool,
}

pub trait Navigation: Send + Sync {
    /// True heading in degrees, if known
    fn heading_true(&self) -> Option<f64>;

    fn position(&self) -> Option<GeoPosition>;

    /// When set, headings found in spoke headers are not used
    fn ignore_radar_heading(&self) -> bool;

    /// Called for every spoke with the heading from its header, or `None`
    /// when that heading is not usable.
    fn set_radar_heading(&self, heading: Option<RadarHeading>);
}

#[derive(Debug)]
pub struct NavigationData {
    heading_true: AtomicF64,
    position_valid: AtomicBool,
    position_lat: AtomicF64,
    position_lon: AtomicF64,
    ignore_radar_heading: AtomicBool,
    radar_heading: AtomicF64,
    radar_heading_true: AtomicBool,
}

impl Default for NavigationData {
    fn default() -> Self {
        NavigationData {
            heading_true: AtomicF64::new(f64::NAN),
            position_valid: AtomicBool::new(false),
            position_lat: AtomicF64::new(f64::NAN),
            position_lon: AtomicF64::new(f64::NAN),
            ignore_radar_heading: AtomicBool::new(false),
            radar_heading: AtomicF64::new(f64::NAN),
            radar_heading_true: AtomicBool::new(false),
        }
    }
}

impl NavigationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed heading and position from the command line, for a radar on a
    /// stationary mount or for testing without a navigation source.
    pub fn from_cli(args: &Cli) -> Self {
        let nav = Self::default();
        nav.set_heading_true(args.heading);
        nav.set_position(args.latitude, args.longitude);
        nav.set_ignore_radar_heading(args.ignore_radar_heading);
        nav
    }

    pub fn set_heading_true(&self, heading: Option<f64>) {
        if let Some(h) = heading {
            self.heading_true.store(h, Ordering::Release);
        } else {
            self.heading_true.store(f64::NAN, Ordering::Release);
        }
    }

    pub fn set_position(&self, lat: Option<f64>, lon: Option<f64>) {
        if let (Some(lat), Some(lon)) = (lat, lon) {
            self.position_lat.store(lat, Ordering::Release);
            self.position_lon.store(lon, Ordering::Release);
            self.position_valid.store(true, Ordering::Release);
        } else {
            self.position_valid.store(false, Ordering::Release);
        }
    }

    pub fn set_ignore_radar_heading(&self, ignore: bool) {
        self.ignore_radar_heading.store(ignore, Ordering::Release);
    }

    /// The heading most recently found in a spoke header
    pub fn radar_heading(&self) -> Option<RadarHeading> {
        let degrees = self.radar_heading.load(Ordering::Acquire);
        if degrees.is_nan() {
            return None;
        }
        Some(RadarHeading {
            degrees,
            is_true: self.radar_heading_true.load(Ordering::Acquire),
        })
    }
}

impl Navigation for NavigationData {
    fn heading_true(&self) -> Option<f64> {
        let heading = self.heading_true.load(Ordering::Acquire);
        if !heading.is_nan() {
            return Some(heading);
        }
        None
    }

    fn position(&self) -> Option<GeoPosition> {
        if self.position_valid.load(Ordering::Acquire) {
            let lat = self.position_lat.load(Ordering::Acquire);
            let lon = self.position_lon.load(Ordering::Acquire);
            return Some(GeoPosition::new(lat, lon));
        }
        None
    }

    fn ignore_radar_heading(&self) -> bool {
        self.ignore_radar_heading.load(Ordering::Acquire)
    }

    fn set_radar_heading(&self, heading: Option<RadarHeading>) {
        match heading {
            Some(h) => {
                self.radar_heading_true.store(h.is_true, Ordering::Release);
                self.radar_heading.store(h.degrees, Ordering::Release);
            }
            None => {
                self.radar_heading.store(f64::NAN, Ordering::Release);
            }
        }
    }
}

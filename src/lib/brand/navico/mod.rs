use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::Cli;

mod data;
mod receive;
mod report;

pub use data::{FrameDecoder, LineHeader, is_heading_true, is_valid_heading_value};
pub use receive::{NavicoReceiver, ReceiverHandle};
pub use report::{
    AlignmentReport, BuildInfoReport, InstallationReport, ParseError, Report, ReportProcessor,
    SettingsReport,
};

// Spoke numbers go from [0..4096>, but only half of them are used.
pub const NAVICO_SPOKES_RAW: u16 = 4096;
pub const NAVICO_SPOKES: u16 = 2048;

// Every byte holds two 4 bit pixels
pub const RADAR_LINE_DATA_LENGTH: usize = 512;
pub const RADAR_LINE_HEADER_LENGTH: usize = 24;
pub const RADAR_LINE_LENGTH: usize = RADAR_LINE_HEADER_LENGTH + RADAR_LINE_DATA_LENGTH;
pub const FRAME_HEADER_LENGTH: usize = 8;

pub const SPOKES_PER_FRAME: usize = 32;
// Anything above this is not a radar frame we know about
pub const MAX_SPOKES_PER_FRAME: usize = 120;

pub const BR24_REPORT_ADDRESS: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 9), 6679);
pub const BR24_DATA_ADDRESS: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 8), 6678);

const BR24_MODEL_NAME: &str = "BR24";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Model {
    #[default]
    Unknown,
    BR24,
    Gen3,
    Gen4,
    HALO,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Model::Unknown => "",
            Model::BR24 => BR24_MODEL_NAME,
            Model::Gen3 => "3G",
            Model::Gen4 => "4G",
            Model::HALO => "HALO",
        };
        write!(f, "{}", s)
    }
}

impl Model {
    /// The model byte of report 03 C4
    pub fn from(model: u8) -> Self {
        match model {
            0x0e => Model::BR24, // Early NorthStar branded BR24
            0x0f => Model::BR24,
            0x08 => Model::Gen3,
            0x01 => Model::Gen4,
            0x00 => Model::HALO,
            _ => Model::Unknown,
        }
    }
}

/// Which layout the 24 byte line headers in a frame use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LineFormat {
    /// BR24 and 3G
    Br24,
    /// 4G and later
    Gen4,
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LineFormat::Br24 => write!(f, "BR24/3G"),
            LineFormat::Gen4 => write!(f, "4G"),
        }
    }
}

/// Where to listen for one radar.
#[derive(Clone, Debug, PartialEq)]
pub struct RadarProfile {
    pub name: String,
    pub report_addr: SocketAddrV4,
    pub data_addr: SocketAddrV4,
    pub only_interface: Option<String>,
    pub allow_loopback: bool,
}

impl RadarProfile {
    pub fn new(name: &str) -> RadarProfile {
        RadarProfile {
            name: name.to_string(),
            report_addr: BR24_REPORT_ADDRESS,
            data_addr: BR24_DATA_ADDRESS,
            only_interface: None,
            allow_loopback: false,
        }
    }

    pub fn from_cli(args: &Cli) -> RadarProfile {
        RadarProfile {
            name: args.name.clone(),
            report_addr: args.report_address,
            data_addr: args.data_address,
            only_interface: args.interface.clone(),
            allow_loopback: args.allow_loopback,
        }
    }
}

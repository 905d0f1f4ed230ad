extern crate tokio;

use clap::Parser;
use std::net::SocketAddrV4;

pub mod brand;
pub mod navdata;
pub mod network;
pub mod protos;
pub mod radar;
pub mod settings;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PACKAGE: &str = env!("CARGO_PKG_NAME");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Name of the radar, used in logging and status messages
    #[arg(long, default_value = "Navico")]
    pub name: String,

    /// Limit radar location to a single interface
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Also look for radars on loopback interfaces
    #[arg(long, default_value_t = false)]
    pub allow_loopback: bool,

    /// Multicast group and port on which the radar sends its reports
    #[arg(long, default_value_t = brand::navico::BR24_REPORT_ADDRESS)]
    pub report_address: SocketAddrV4,

    /// Multicast group and port on which the radar sends its spokes
    #[arg(long, default_value_t = brand::navico::BR24_DATA_ADDRESS)]
    pub data_address: SocketAddrV4,

    /// Do not use the heading that the radar reports in its spokes
    #[arg(long, default_value_t = false)]
    pub ignore_radar_heading: bool,

    /// Fixed true heading in degrees, for a radar on a stationary mount
    #[arg(long, allow_hyphen_values = true)]
    pub heading: Option<f64>,

    /// Fixed latitude in degrees
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Fixed longitude in degrees
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Write RadarMessage data to stdout
    #[arg(long, default_value_t = false)]
    pub output: bool,

    /// Log the radar statistics every this many seconds, 0 is never
    #[arg(long, default_value_t = 10)]
    pub statistics_interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn defaults() {
        let args = Cli::try_parse_from(["mayara-navico"]).unwrap();
        assert_eq!(args.name, "Navico");
        assert_eq!(args.report_address, brand::navico::BR24_REPORT_ADDRESS);
        assert_eq!(args.data_address, brand::navico::BR24_DATA_ADDRESS);
        assert_eq!(args.interface, None);
        assert!(!args.ignore_radar_heading);
        assert!(!args.output);
    }

    #[test]
    fn options() {
        let args = Cli::try_parse_from([
            "mayara-navico",
            "-i",
            "eth1",
            "--report-address",
            "236.6.7.15:6680",
            "--heading",
            "-12.5",
            "--latitude",
            "52.1",
            "--longitude",
            "-4.3",
            "--ignore-radar-heading",
        ])
        .unwrap();
        assert_eq!(args.interface.as_deref(), Some("eth1"));
        assert_eq!(
            args.report_address,
            SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 15), 6680)
        );
        assert_eq!(args.heading, Some(-12.5));
        assert_eq!(args.longitude, Some(-4.3));
        assert!(args.ignore_radar_heading);

        let profile = brand::navico::RadarProfile::from_cli(&args);
        assert_eq!(profile.only_interface.as_deref(), Some("eth1"));
        assert_eq!(profile.data_addr, brand::navico::BR24_DATA_ADDRESS);
    }

    #[test]
    fn latitude_needs_longitude() {
        assert!(Cli::try_parse_from(["mayara-navico", "--latitude", "52.1"]).is_err());
    }
}

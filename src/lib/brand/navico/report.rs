use bincode::deserialize;
use enum_primitive_derive::Primitive;
use log::{debug, info, trace};
use num_traits::FromPrimitive;
use serde::Deserialize;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::radar::{Power, SharedRadarState};
use crate::settings::{AutoMode, ControlId, ControlValue};
use crate::util::c_wide_string;

use super::Model;

// Byte 0 is the report id, byte 1 the family. Ids and lengths observed:
//   C4: 01/18 status, 02/99 settings, 03/129 build info, 04/66 alignment,
//       05, 07, 08/18 installation
//   F5: 08 0C 0D 0F 10 11 12 13 14 (BR24 only, content unknown)
// A C4 report is only decoded when both its id and its length match.
const REPORT_FAMILY_C4: u8 = 0xC4;
const REPORT_FAMILY_F5: u8 = 0xF5;

const REPORT_01_C4_18: (usize, u8) = (18, 0x01);
const REPORT_02_C4_99: (usize, u8) = (99, 0x02);
const REPORT_03_C4_129: (usize, u8) = (129, 0x03);
const REPORT_04_C4_66: (usize, u8) = (66, 0x04);
const REPORT_08_C4_18: (usize, u8) = (18, 0x08);

#[derive(Primitive, Copy, Clone, Debug, PartialEq, Eq)]
enum RadarStatus {
    Standby = 0x01,
    Transmit = 0x02,
    WakingUp = 0x05,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Report too short: {0} bytes")]
    TooShort(usize),
    #[error("Not a radar report, second byte 0x{0:02x}")]
    NotAReport(u8),
    #[error("Illegible report {id:02x}: {message}")]
    Illegible { id: u8, message: String },
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct RadarReport1_18 {
    _what: u8,
    _command: u8,
    status: u8,
    _u00: [u8; 15], // Lots of unknown
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct RadarReport2_99 {
    _what: u8,
    _command: u8,
    range: [u8; 4],             // 2..6 = range in decimeters
    _u00: [u8; 2],              // 6..8
    gain_auto: [u8; 4],         // 8..12 = 1 when gain is automatic
    gain: u8,                   // 12
    sea_auto: u8,               // 13 = sea_auto, 0 = off, 1 = harbor, 2 = offshore
    _u02: [u8; 3],              // 14..17
    sea: [u8; 4],               // 17..21
    _u03: u8,                   // 21
    rain: u8,                   // 22
    _u04: [u8; 11],             // 23..34
    interference_rejection: u8, // 34
    _u05: [u8; 3],              // 35..38
    target_expansion: u8,       // 38
    _u06: [u8; 3],              // 39..42
    target_boost: u8,           // 42
    _u07: [u8; 32],             // 43..75
    _u08: [u8; 24],             // 75..99
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct RadarReport3_129 {
    _what: u8,
    _command: u8,
    model: u8,               // 01 = 4G, 08 = 3G, 0E and 0F = BR24, 00 = HALO
    _u00: [u8; 31],          // Lots of unknown
    hours: [u8; 4],          // Hours of operation
    _u01: [u8; 20],          // Lots of unknown
    firmware_date: [u8; 32], // Wide chars, assumed UTF16
    firmware_time: [u8; 32], // Wide chars, assumed UTF16
    _u02: [u8; 7],
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct RadarReport4_66 {
    _what: u8,
    _command: u8,
    _u00: [u8; 4],              // 2..6
    bearing_alignment: [u8; 2], // 6..8 in tenths of a degree
    _u01: [u8; 2],              // 8..10
    antenna_height: [u8; 2],    // 10..12 = Antenna height in mm
    _u02: [u8; 7],              // 12..19
    _accent_light: u8,          // 19 = Accent light (HALO only)
    _u03: [u8; 32],             // 20..52
    _u04: [u8; 14],             // 52..66
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct RadarReport8_18 {
    // 08 c4  length 18
    _what: u8,                        // 0  0x08
    _command: u8,                     // 1  0xC4
    _sea_state: u8,                   // 2
    local_interference_rejection: u8, // 3
    scan_speed: u8,                   // 4
    sls_auto: u8,                     // 5 installation: sidelobe suppression auto
    _field6: u8,                      // 6
    _field7: u8,                      // 7
    _field8: u8,                      // 8
    side_lobe_suppression: u8,        // 9 installation: sidelobe suppression
    _field10: [u8; 2],                // 10-11
    noise_rejection: u8,              // 12    noise rejection
    target_sep: u8,                   // 13
    _field14: [u8; 4],                // 14-17
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsReport {
    /// Decimeters
    pub range: u32,
    pub gain: u8,
    pub gain_auto: bool,
    pub sea_auto: u8,
    pub sea: u32,
    pub rain: u8,
    pub interference_rejection: u8,
    pub target_expansion: u8,
    pub target_boost: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfoReport {
    pub model: u8,
    pub operating_hours: u32,
    pub firmware_date: String,
    pub firmware_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Tenths of a degree, [0..3600>
    pub bearing_alignment: u16,
    /// Millimeters
    pub antenna_height: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationReport {
    pub local_interference_rejection: u8,
    pub scan_speed: u8,
    pub sls_auto: bool,
    pub side_lobe_suppression: u8,
    pub noise_rejection: u8,
    pub target_separation: u8,
}

/// A report datagram, decoded but not yet applied to any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Status(u8),
    Settings(SettingsReport),
    BuildInfo(BuildInfoReport),
    Alignment(AlignmentReport),
    Installation(InstallationReport),
    /// A C4 report with an id or length that we don't decode
    Unknown { id: u8, len: usize },
    /// Anything from the F5 family; sent by BR24 radars, meaning unknown
    Reserved { id: u8, len: usize },
}

fn decode<'a, T: Deserialize<'a>>(id: u8, data: &'a [u8]) -> Result<T, ParseError> {
    deserialize::<T>(data).map_err(|e| ParseError::Illegible {
        id,
        message: e.to_string(),
    })
}

impl Report {
    pub fn parse(data: &[u8]) -> Result<Report, ParseError> {
        if data.len() < 2 {
            return Err(ParseError::TooShort(data.len()));
        }
        let id = data[0];

        match data[1] {
            REPORT_FAMILY_C4 => {}
            REPORT_FAMILY_F5 => {
                return Ok(Report::Reserved {
                    id,
                    len: data.len(),
                });
            }
            family => return Err(ParseError::NotAReport(family)),
        }

        let report = match (data.len(), id) {
            REPORT_01_C4_18 => {
                let report: RadarReport1_18 = decode(id, data)?;
                Report::Status(report.status)
            }
            REPORT_02_C4_99 => {
                let report: RadarReport2_99 = decode(id, data)?;
                Report::Settings(SettingsReport {
                    range: u32::from_le_bytes(report.range),
                    gain: report.gain,
                    gain_auto: u32::from_le_bytes(report.gain_auto) == 1,
                    sea_auto: report.sea_auto,
                    sea: u32::from_le_bytes(report.sea),
                    rain: report.rain,
                    interference_rejection: report.interference_rejection,
                    target_expansion: report.target_expansion,
                    target_boost: report.target_boost,
                })
            }
            REPORT_03_C4_129 => {
                let report: RadarReport3_129 = decode(id, data)?;
                Report::BuildInfo(BuildInfoReport {
                    model: report.model,
                    operating_hours: u32::from_le_bytes(report.hours),
                    firmware_date: c_wide_string(&report.firmware_date),
                    firmware_time: c_wide_string(&report.firmware_time),
                })
            }
            REPORT_04_C4_66 => {
                let report: RadarReport4_66 = decode(id, data)?;
                Report::Alignment(AlignmentReport {
                    bearing_alignment: u16::from_le_bytes(report.bearing_alignment),
                    antenna_height: u16::from_le_bytes(report.antenna_height),
                })
            }
            REPORT_08_C4_18 => {
                let report: RadarReport8_18 = decode(id, data)?;
                Report::Installation(InstallationReport {
                    local_interference_rejection: report.local_interference_rejection,
                    scan_speed: report.scan_speed,
                    sls_auto: report.sls_auto == 1,
                    side_lobe_suppression: report.side_lobe_suppression,
                    noise_rejection: report.noise_rejection,
                    target_separation: report.target_sep,
                })
            }
            (len, id) => Report::Unknown { id, len },
        };
        Ok(report)
    }
}

fn sea_auto_mode(sea_auto: u8) -> Option<AutoMode> {
    match sea_auto {
        0 => None,
        1 => Some(AutoMode::Harbour),
        2 => Some(AutoMode::Offshore),
        _ => Some(AutoMode::Auto),
    }
}

/// Applies report datagrams to the radar state.
#[derive(Debug)]
pub struct ReportProcessor {
    key: String,
    reported_unknown: [bool; 256],
}

impl ReportProcessor {
    pub fn new(key: &str) -> ReportProcessor {
        ReportProcessor {
            key: key.to_string(),
            reported_unknown: [false; 256],
        }
    }

    /// Returns whether `data` was recognised as a radar report at all. That
    /// includes reports that are known to exist but are not decoded.
    pub fn process_report(&mut self, data: &[u8], state: &SharedRadarState) -> bool {
        trace!("{}: report {:02X?}", self.key, data);

        match Report::parse(data) {
            Ok(report) => {
                self.apply(report, state);
                true
            }
            Err(e) => {
                debug!("{}: {}", self.key, e);
                state.write().statistics.unknown_reports += 1;
                false
            }
        }
    }

    fn apply(&mut self, report: Report, state: &SharedRadarState) {
        match report {
            Report::Status(status) => self.process_status(status, state),
            Report::Settings(report) => self.process_settings(report, state),
            Report::BuildInfo(report) => self.process_build_info(report, state),
            Report::Alignment(report) => {
                let mut bearing_alignment = report.bearing_alignment as i32 / 10;
                if bearing_alignment > 180 {
                    bearing_alignment -= 360;
                }
                debug!(
                    "{}: bearing alignment {} antenna height {} mm",
                    self.key, bearing_alignment, report.antenna_height
                );

                let mut state = state.write();
                state.controls.set(
                    ControlId::BearingAlignment,
                    ControlValue::scaled(report.bearing_alignment as i32, bearing_alignment),
                );
                state.controls.set(
                    ControlId::AntennaHeight,
                    ControlValue::scaled(
                        report.antenna_height as i32,
                        report.antenna_height as i32 / 1000,
                    ),
                );
            }
            Report::Installation(report) => {
                debug!("{}: installation {:?}", self.key, report);

                let sls_auto = report.sls_auto.then_some(AutoMode::Auto);
                let mut state = state.write();
                let controls = &mut state.controls;
                controls.set(
                    ControlId::LocalInterferenceRejection,
                    ControlValue::new(report.local_interference_rejection as i32),
                );
                controls.set(
                    ControlId::ScanSpeed,
                    ControlValue::new(report.scan_speed as i32),
                );
                controls.set(
                    ControlId::SideLobeSuppression,
                    ControlValue::percentage(report.side_lobe_suppression).with_auto(sls_auto),
                );
                controls.set(
                    ControlId::NoiseRejection,
                    ControlValue::new(report.noise_rejection as i32),
                );
                controls.set(
                    ControlId::TargetSeparation,
                    ControlValue::new(report.target_separation as i32),
                );
            }
            Report::Unknown { id, len } => {
                if !self.reported_unknown[id as usize] {
                    debug!(
                        "{}: Unknown report {:02x} C4 len {}",
                        self.key, id, len
                    );
                    self.reported_unknown[id as usize] = true;
                }
                state.write().statistics.unknown_reports += 1;
            }
            Report::Reserved { id, len } => {
                trace!("{}: report {:02x} F5 len {} ignored", self.key, id, len);
                state.write().statistics.unknown_reports += 1;
            }
        }
    }

    fn process_status(&mut self, status: u8, state: &SharedRadarState) {
        let (power, text) = match RadarStatus::from_u8(status) {
            Some(RadarStatus::Standby) => (Some(Power::Standby), "Standby"),
            Some(RadarStatus::Transmit) => (Some(Power::Transmit), "Transmit"),
            Some(RadarStatus::WakingUp) => (Some(Power::WakingUp), "Waking up"),
            None => (None, "Unknown status"),
        };

        match power {
            Some(power) => {
                if state.set_power(power) {
                    debug!("{}: radar reports {}", self.key, power);
                }
            }
            None => {
                debug!("{}: radar reports unknown status 0x{:02x}", self.key, status);
            }
        }

        let (name, addr) = {
            let state = state.read();
            (
                state.name.clone(),
                state.radar_addr.map(|a| *a.ip()).unwrap_or(Ipv4Addr::UNSPECIFIED),
            )
        };
        state.set_status(format!("{} IP {} {}", name, addr, text));
    }

    fn process_settings(&mut self, report: SettingsReport, state: &SharedRadarState) {
        debug!("{}: settings {:?}", self.key, report);

        let gain_auto = report.gain_auto.then_some(AutoMode::Auto);
        let sea = report.sea.min(u8::MAX as u32) as u8;

        let mut state = state.write();
        let controls = &mut state.controls;
        controls.set(
            ControlId::Range,
            ControlValue::scaled(report.range as i32, (report.range / 10) as i32),
        );
        controls.set(
            ControlId::Gain,
            ControlValue::percentage(report.gain).with_auto(gain_auto),
        );
        controls.set(
            ControlId::Sea,
            ControlValue::percentage(sea).with_auto(sea_auto_mode(report.sea_auto)),
        );
        controls.set(ControlId::Rain, ControlValue::percentage(report.rain));
        controls.set(
            ControlId::InterferenceRejection,
            ControlValue::new(report.interference_rejection as i32),
        );
        controls.set(
            ControlId::TargetExpansion,
            ControlValue::new(report.target_expansion as i32),
        );
        controls.set(
            ControlId::TargetBoost,
            ControlValue::new(report.target_boost as i32),
        );
    }

    fn process_build_info(&mut self, report: BuildInfoReport, state: &SharedRadarState) {
        let model = Model::from(report.model);
        let build_info = format!(
            "Firmware date: {} {}",
            report.firmware_date, report.firmware_time
        );

        let mut state = state.write();
        if state.model != model {
            if model == Model::Unknown {
                info!("{}: Unknown radar model 0x{:02x}", self.key, report.model);
            } else {
                info!("{}: Radar is model {}", self.key, model);
            }
            state.model = model;
        }
        if state.build_info.as_deref() != Some(build_info.as_str()) {
            info!("{}: {}", self.key, build_info);
            state.build_info = Some(build_info);
        }
        state.controls.set(
            ControlId::OperatingHours,
            ControlValue::new(report.operating_hours as i32),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    fn report(id: u8, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[0] = id;
        data[1] = REPORT_FAMILY_C4;
        data
    }

    fn status_report(status: u8) -> Vec<u8> {
        let mut data = report(0x01, 18);
        data[2] = status;
        data
    }

    fn wide(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
    }

    fn setup() -> (ReportProcessor, SharedRadarState) {
        let state = SharedRadarState::new("Navico");
        state.write().radar_addr = Some(SocketAddrV4::new(Ipv4Addr::new(10, 56, 0, 161), 6679));
        (ReportProcessor::new("Navico"), state)
    }

    #[test]
    fn status_transitions() {
        let (mut processor, state) = setup();

        assert!(processor.process_report(&status_report(0x02), &state));
        assert_eq!(state.power(), Power::Transmit);
        assert_eq!(state.status(), "Navico IP 10.56.0.161 Transmit");

        assert!(processor.process_report(&status_report(0x01), &state));
        assert_eq!(state.power(), Power::Standby);
        assert_eq!(state.status(), "Navico IP 10.56.0.161 Standby");

        assert!(processor.process_report(&status_report(0x05), &state));
        assert_eq!(state.power(), Power::WakingUp);
        assert_eq!(state.status(), "Navico IP 10.56.0.161 Waking up");
    }

    #[test]
    fn unknown_status_keeps_power() {
        let (mut processor, state) = setup();
        processor.process_report(&status_report(0x02), &state);

        assert!(processor.process_report(&status_report(0x07), &state));
        assert_eq!(state.power(), Power::Transmit);
        assert_eq!(state.status(), "Navico IP 10.56.0.161 Unknown status");
        assert_eq!(state.statistics().unknown_reports, 0);
    }

    #[test]
    fn length_is_part_of_identity() {
        assert_eq!(
            Report::parse(&report(0x01, 17)),
            Ok(Report::Unknown { id: 0x01, len: 17 })
        );
        assert_eq!(
            Report::parse(&report(0x02, 100)),
            Ok(Report::Unknown { id: 0x02, len: 100 })
        );

        let (mut processor, state) = setup();
        assert!(processor.process_report(&report(0x01, 17), &state));
        assert!(processor.process_report(&report(0x07, 188), &state));
        assert_eq!(state.power(), Power::Off);
        assert_eq!(state.statistics().unknown_reports, 2);
    }

    #[test]
    fn settings() {
        let mut data = report(0x02, 99);
        data[2..6].copy_from_slice(&15000u32.to_le_bytes());
        data[8..12].copy_from_slice(&1u32.to_le_bytes());
        data[12] = 128;
        data[13] = 1;
        data[17..21].copy_from_slice(&100u32.to_le_bytes());
        data[22] = 255;
        data[34] = 2;
        data[38] = 1;
        data[42] = 2;

        let (mut processor, state) = setup();
        assert!(processor.process_report(&data, &state));

        let controls = state.controls();
        assert_eq!(
            controls.get(ControlId::Range),
            Some(ControlValue::scaled(15000, 1500))
        );
        assert_eq!(
            controls.get(ControlId::Gain),
            Some(ControlValue::percentage(128).with_auto(Some(AutoMode::Auto)))
        );
        assert_eq!(controls.get(ControlId::Gain).unwrap().value, 50);
        assert_eq!(
            controls.get(ControlId::Sea),
            Some(ControlValue::percentage(100).with_auto(Some(AutoMode::Harbour)))
        );
        assert_eq!(controls.get(ControlId::Rain).unwrap().value, 100);
        assert_eq!(
            controls.get(ControlId::InterferenceRejection),
            Some(ControlValue::new(2))
        );
        assert_eq!(
            controls.get(ControlId::TargetExpansion),
            Some(ControlValue::new(1))
        );
        assert_eq!(
            controls.get(ControlId::TargetBoost),
            Some(ControlValue::new(2))
        );
    }

    #[test]
    fn settings_manual_gain_and_offshore_sea() {
        let mut data = report(0x02, 99);
        data[12] = 51;
        data[13] = 2;
        data[17..21].copy_from_slice(&1000u32.to_le_bytes());

        let (mut processor, state) = setup();
        processor.process_report(&data, &state);

        let controls = state.controls();
        let gain = controls.get(ControlId::Gain).unwrap();
        assert!(!gain.is_auto());
        assert_eq!(gain.value, 20);
        let sea = controls.get(ControlId::Sea).unwrap();
        assert_eq!(sea.auto, Some(AutoMode::Offshore));
        assert_eq!(sea.value, 100);
    }

    #[test]
    fn build_info() {
        let mut data = report(0x03, 129);
        data[2] = 0x01;
        data[34..38].copy_from_slice(&1234u32.to_le_bytes());
        let date = wide("Jan 21 2016");
        data[58..58 + date.len()].copy_from_slice(&date);
        let time = wide("12:34:56");
        data[90..90 + time.len()].copy_from_slice(&time);

        let (mut processor, state) = setup();
        assert!(processor.process_report(&data, &state));

        assert_eq!(state.model(), Model::Gen4);
        assert_eq!(
            state.build_info().as_deref(),
            Some("Firmware date: Jan 21 2016 12:34:56")
        );
        assert_eq!(
            state.controls().get(ControlId::OperatingHours),
            Some(ControlValue::new(1234))
        );
    }

    #[test]
    fn alignment() {
        let mut data = report(0x04, 66);
        data[6..8].copy_from_slice(&3550u16.to_le_bytes());
        data[10..12].copy_from_slice(&4500u16.to_le_bytes());

        let (mut processor, state) = setup();
        assert!(processor.process_report(&data, &state));
        let controls = state.controls();
        assert_eq!(controls.get(ControlId::BearingAlignment).unwrap().value, -5);
        assert_eq!(controls.get(ControlId::AntennaHeight).unwrap().value, 4);

        data[6..8].copy_from_slice(&900u16.to_le_bytes());
        processor.process_report(&data, &state);
        assert_eq!(
            state.controls().get(ControlId::BearingAlignment).unwrap().value,
            90
        );
    }

    #[test]
    fn installation() {
        let mut data = report(0x08, 18);
        data[3] = 1;
        data[4] = 1;
        data[5] = 1;
        data[9] = 255;
        data[12] = 2;
        data[13] = 3;

        assert_eq!(
            Report::parse(&data),
            Ok(Report::Installation(InstallationReport {
                local_interference_rejection: 1,
                scan_speed: 1,
                sls_auto: true,
                side_lobe_suppression: 255,
                noise_rejection: 2,
                target_separation: 3,
            }))
        );

        let (mut processor, state) = setup();
        assert!(processor.process_report(&data, &state));
        let controls = state.controls();
        let sls = controls.get(ControlId::SideLobeSuppression).unwrap();
        assert!(sls.is_auto());
        assert_eq!(sls.value, 100);
        assert_eq!(
            controls.get(ControlId::TargetSeparation),
            Some(ControlValue::new(3))
        );
        assert_eq!(
            controls.get(ControlId::LocalInterferenceRejection),
            Some(ControlValue::new(1))
        );
    }

    #[test]
    fn reserved_family() {
        let data = [0x08, REPORT_FAMILY_F5, 0x00, 0x00];
        assert_eq!(
            Report::parse(&data),
            Ok(Report::Reserved { id: 0x08, len: 4 })
        );

        let (mut processor, state) = setup();
        assert!(processor.process_report(&data, &state));
        assert_eq!(state.statistics().unknown_reports, 1);
    }

    #[test]
    fn not_a_report() {
        assert_eq!(Report::parse(&[0x01]), Err(ParseError::TooShort(1)));
        assert_eq!(
            Report::parse(&[0x01, 0xB1]),
            Err(ParseError::NotAReport(0xB1))
        );

        let (mut processor, state) = setup();
        assert!(!processor.process_report(&[], &state));
        assert!(!processor.process_report(&[0x01, 0xB1], &state));
        assert_eq!(state.statistics().unknown_reports, 2);
        assert_eq!(state.power(), Power::Off);
    }
}

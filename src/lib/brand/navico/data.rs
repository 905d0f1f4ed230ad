use bincode::deserialize;
use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::navdata::{Navigation, RadarHeading};
use crate::radar::spoke::Spoke;
use crate::radar::{SharedRadarState, SpokeBearing, Statistics};
use crate::util::PrintableSpoke;

use super::{
    FRAME_HEADER_LENGTH, LineFormat, MAX_SPOKES_PER_FRAME, NAVICO_SPOKES, NAVICO_SPOKES_RAW,
    RADAR_LINE_HEADER_LENGTH, RADAR_LINE_LENGTH, SPOKES_PER_FRAME,
};

/*
 Heading bits as seen in the field:
 - BR24 without RI: 0x9234, high bit set so unusable
 - 3G with RI, true heading: 0x45be
 - 4G with RI, magnetic heading: 0x07d6 = 2006 = 176.3 deg
 - 4G with RI, no heading: 0x8000
*/
const HEADING_TRUE_FLAG: u16 = 0x4000;
const HEADING_MASK: u16 = NAVICO_SPOKES_RAW - 1;

pub fn is_heading_true(x: u16) -> bool {
    (x & HEADING_TRUE_FLAG) != 0
}

/// Any bit outside the true flag and the 12 bit heading makes the value unusable
pub fn is_valid_heading_value(x: u16) -> bool {
    (x & !(HEADING_TRUE_FLAG | HEADING_MASK)) == 0
}

// On BR24 and 3G radars this is always at offset 4 of every line header
const BR24_MARK: [u8; 4] = [0x00, 0x44, 0x0d, 0x0e];

const VALID_LINE_STATUS: [u8; 2] = [0x02, 0x12];

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct Br24Header {
    header_len: u8,       // 1 bytes
    status: u8,           // 1 bytes
    scan_number: [u8; 2], // 2 bytes, 0-4095
    _mark: [u8; 4],       // 4 bytes 0x00, 0x44, 0x0d, 0x0e
    angle: [u8; 2],       // 2 bytes
    heading: [u8; 2],     // 2 bytes heading with RI-10/11 or -1. See bitmask explanation above.
    range: [u8; 4],       // 4 bytes, of which the low three hold the range
    _u01: [u8; 2],        // 2 bytes blank
    _u02: [u8; 2],        // 2 bytes
    _u03: [u8; 4],        // 4 bytes blank
} /* total size = 24 */

#[derive(Deserialize, Debug, Clone, Copy)]
#[repr(packed)]
struct Gen4Header {
    header_len: u8,       // 1 bytes
    status: u8,           // 1 bytes
    scan_number: [u8; 2], // 2 bytes, 0-4095
    _u00: [u8; 2],        // Always 0x4400 (integer)
    large_range: [u8; 2], // 2 bytes or -1
    angle: [u8; 2],       // 2 bytes
    heading: [u8; 2],     // 2 bytes heading with RI-10/11 or -1. See bitmask explanation above.
    small_range: [u8; 2], // 2 bytes or -1
    _rotation: [u8; 2],   // 2 bytes, looks like rotation/angle
    _u01: [u8; 4],        // 4 bytes signed integer, always -1
    _u02: [u8; 4],        // 4 bytes signed integer, mostly -1 (0x80 in last byte) or 0xa0 in last byte
} /* total size = 24 */

/// The fields of a line header that matter, whatever its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHeader {
    pub format: LineFormat,
    pub header_len: u8,
    pub status: u8,
    pub scan_number: u16,
    pub angle: u16,
    pub heading: u16,
    /// Meters
    pub range: u32,
}

impl LineHeader {
    /// Returns `None` when `header` is shorter than a line header.
    pub fn parse(header: &[u8]) -> Option<LineHeader> {
        if header.len() < RADAR_LINE_HEADER_LENGTH {
            return None;
        }
        let header = &header[..RADAR_LINE_HEADER_LENGTH];

        if header[4..8] == BR24_MARK {
            deserialize::<Br24Header>(header)
                .ok()
                .map(|h| LineHeader::from_br24(&h))
        } else {
            deserialize::<Gen4Header>(header)
                .ok()
                .map(|h| LineHeader::from_gen4(&h))
        }
    }

    fn from_br24(header: &Br24Header) -> LineHeader {
        let range = header.range;
        let range_raw = u32::from_le_bytes([range[0], range[1], range[2], 0]);

        LineHeader {
            format: LineFormat::Br24,
            header_len: header.header_len,
            status: header.status,
            scan_number: u16::from_le_bytes(header.scan_number),
            angle: u16::from_le_bytes(header.angle),
            heading: u16::from_le_bytes(header.heading),
            range: (range_raw as f64 * 10.0 / std::f64::consts::SQRT_2) as u32,
        }
    }

    fn from_gen4(header: &Gen4Header) -> LineHeader {
        let large_range = i16::from_le_bytes(header.large_range);
        let small_range = i16::from_le_bytes(header.small_range);

        let range_raw: i32 = if large_range == 0x80 {
            if small_range == -1 {
                0 // Invalid range received
            } else {
                small_range as i32
            }
        } else {
            large_range as i32 * 256
        };

        LineHeader {
            format: LineFormat::Gen4,
            header_len: header.header_len,
            status: header.status,
            scan_number: u16::from_le_bytes(header.scan_number),
            angle: u16::from_le_bytes(header.angle),
            heading: u16::from_le_bytes(header.heading),
            range: (range_raw / 4).max(0) as u32,
        }
    }
}

fn raw_to_degrees(raw: u16) -> f64 {
    raw as f64 * 360. / NAVICO_SPOKES_RAW as f64
}

fn degrees_to_raw(degrees: f64) -> u16 {
    ((degrees.rem_euclid(360.) * NAVICO_SPOKES_RAW as f64 / 360.) as u16) % NAVICO_SPOKES_RAW
}

fn now_millis() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .ok()
}

/// Turns data frames into spokes, keeping count of what was lost on the way.
#[derive(Debug)]
pub struct FrameDecoder {
    key: String,
    next_spoke: Option<u16>,
    line_format: Option<LineFormat>,
    started: Instant,
    received_first_spoke: bool,
    reported_short_frame: bool,
}

impl FrameDecoder {
    pub fn new(key: &str) -> FrameDecoder {
        FrameDecoder {
            key: key.to_string(),
            next_spoke: None,
            line_format: None,
            started: Instant::now(),
            received_first_spoke: false,
            reported_short_frame: false,
        }
    }

    /// Decode one frame datagram. The statistics in `state` are updated for
    /// every line seen; the spokes that passed validation are returned.
    pub fn process_frame(
        &mut self,
        data: &[u8],
        navigation: &dyn Navigation,
        state: &SharedRadarState,
    ) -> Vec<Spoke> {
        let time = now_millis();
        let position = navigation.position();
        let ignore_radar_heading = navigation.ignore_radar_heading();
        let mut spokes = Vec::new();

        let mut state = state.write();
        state.statistics.packets += 1;

        if data.len() < FRAME_HEADER_LENGTH {
            state.statistics.broken_packets += 1;
            if !self.reported_short_frame {
                warn!(
                    "{}: UDP data frame without frame header, len {} dropped",
                    self.key,
                    data.len()
                );
                self.reported_short_frame = true;
            }
            return spokes;
        }

        let mut scanlines_in_packet = (data.len() - FRAME_HEADER_LENGTH) / RADAR_LINE_LENGTH;
        if scanlines_in_packet != SPOKES_PER_FRAME {
            state.statistics.broken_packets += 1;
            debug!(
                "{}: UDP data frame with {} spokes, len {}",
                self.key,
                scanlines_in_packet,
                data.len()
            );
            if scanlines_in_packet > MAX_SPOKES_PER_FRAME {
                scanlines_in_packet = MAX_SPOKES_PER_FRAME;
            }
        }

        trace!(
            "{}: Received UDP frame with {} spokes",
            self.key, scanlines_in_packet
        );

        let mut offset: usize = FRAME_HEADER_LENGTH;
        for scanline in 0..scanlines_in_packet {
            let header_slice = &data[offset..offset + RADAR_LINE_HEADER_LENGTH];
            let spoke_slice = &data[offset + RADAR_LINE_HEADER_LENGTH..offset + RADAR_LINE_LENGTH];
            offset += RADAR_LINE_LENGTH;

            state.statistics.spokes += 1;

            let Some(header) = LineHeader::parse(header_slice) else {
                warn!("{}: Illegible spoke header {:02X?}", self.key, header_slice);
                self.skip_line(None, &mut state.statistics);
                continue;
            };
            trace!("{}: Received {:04} header {:?}", self.key, scanline, header);

            let spoke = header.scan_number & (NAVICO_SPOKES_RAW - 1);

            if header.header_len != RADAR_LINE_HEADER_LENGTH as u8 {
                debug!(
                    "{}: Spoke {} with illegal header length ({}) ignored",
                    self.key, spoke, header.header_len
                );
                self.skip_line(Some(spoke), &mut state.statistics);
                continue;
            }

            if !VALID_LINE_STATUS.contains(&header.status) {
                trace!(
                    "{}: Spoke {} with unexpected status 0x{:02x}",
                    self.key, spoke, header.status
                );
                state.statistics.broken_lines += 1;
            }

            if let Some(next) = self.next_spoke {
                if spoke != next {
                    let missing = (spoke + NAVICO_SPOKES_RAW - next) % NAVICO_SPOKES_RAW;
                    trace!(
                        "{}: Spoke {} expected {}, {} missing",
                        self.key, spoke, next, missing
                    );
                    state.statistics.missing_spokes += missing as u64;
                }
            }
            self.next_spoke = Some((spoke + 1) % NAVICO_SPOKES_RAW);

            if self.line_format != Some(header.format) {
                info!("{}: Spoke headers are in {} format", self.key, header.format);
                self.line_format = Some(header.format);
                state.line_format = Some(header.format);
            }

            let radar_heading = if !ignore_radar_heading && is_valid_heading_value(header.heading)
            {
                Some(header.heading & HEADING_MASK)
            } else {
                None
            };
            navigation.set_radar_heading(radar_heading.map(|h| RadarHeading {
                degrees: raw_to_degrees(h),
                is_true: is_heading_true(header.heading),
            }));

            // A magnetic heading from the radar is no use for a true bearing
            let heading: Option<u16> = match radar_heading {
                Some(h) if is_heading_true(header.heading) => Some(h),
                _ => navigation.heading_true().map(degrees_to_raw),
            };

            let angle: SpokeBearing = (header.angle / 2) % NAVICO_SPOKES;
            let bearing: Option<SpokeBearing> = heading.map(|h| {
                (((header.angle as u32 + h as u32) / 2) % NAVICO_SPOKES as u32) as SpokeBearing
            });

            if !self.received_first_spoke {
                info!(
                    "{}: First radar spoke received after {} ms",
                    self.key,
                    self.started.elapsed().as_millis()
                );
                self.received_first_spoke = true;
            }
            trace!(
                "{}: Received {:04} spoke {}",
                self.key,
                scanline,
                PrintableSpoke::new(spoke_slice)
            );

            spokes.push(Spoke {
                angle,
                bearing,
                range: header.range,
                time,
                position,
                data: spoke_slice.to_vec(),
            });
        }

        spokes
    }

    /// A line that is not turned into a spoke still takes its place in the
    /// sequence: it counts as one missing spoke and moves the expected
    /// spoke number along.
    fn skip_line(&mut self, spoke: Option<u16>, statistics: &mut Statistics) {
        statistics.missing_spokes += 1;
        self.next_spoke = match (self.next_spoke, spoke) {
            (Some(next), _) => Some((next + 1) % NAVICO_SPOKES_RAW),
            (None, Some(spoke)) => Some((spoke + 1) % NAVICO_SPOKES_RAW),
            (None, None) => None,
        };
    }
}

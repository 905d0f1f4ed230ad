use protobuf::Message;

use crate::protos::RadarMessage::RadarMessage;
use crate::protos::RadarMessage::radar_message::Spoke as ProtobufSpoke;
use crate::radar::{GeoPosition, SpokeBearing};

/// One decoded radar line, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct Spoke {
    /// Relative to the bow, [0..2048>
    pub angle: SpokeBearing,
    /// Relative to true north, when a heading was known
    pub bearing: Option<SpokeBearing>,
    /// Meters covered by `data`
    pub range: u32,
    /// Millis since the epoch at which the frame was received
    pub time: Option<u64>,
    pub position: Option<GeoPosition>,
    pub data: Vec<u8>,
}

impl Spoke {
    pub fn to_protobuf(&self) -> ProtobufSpoke {
        log::trace!(
            "Spoke {}/{:?}/{} len {}",
            self.range,
            self.bearing,
            self.angle,
            self.data.len()
        );

        let mut spoke = ProtobufSpoke::new();
        spoke.range = self.range;
        spoke.angle = self.angle as u32;
        spoke.bearing = self.bearing.map(|b| b as u32);
        if let Some(position) = self.position {
            spoke.lat = Some((position.lat() * 1e16) as i64);
            spoke.lon = Some((position.lon() * 1e16) as i64);
        }
        spoke.time = self.time;
        spoke.data = self.data.clone();

        spoke
    }
}

pub fn to_radar_message(radar: u32, spokes: &[Spoke]) -> RadarMessage {
    let mut message = RadarMessage::new();
    message.radar = radar;
    message.spokes = spokes.iter().map(Spoke::to_protobuf).collect();
    message
}

/// Encoded `RadarMessage`, as written to stdout with `--output`
pub fn to_radar_message_bytes(radar: u32, spokes: &[Spoke]) -> protobuf::Result<Vec<u8>> {
    to_radar_message(radar, spokes).write_to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protobuf_fields() {
        let spoke = Spoke {
            angle: 1000,
            bearing: Some(1500),
            range: 1852,
            time: Some(1_700_000_000_000),
            position: Some(GeoPosition::new(52.5, -4.25)),
            data: vec![0x12, 0x34],
        };

        let message = to_radar_message(1, &[spoke.clone(), spoke]);
        assert_eq!(message.radar, 1);
        assert_eq!(message.spokes.len(), 2);

        let p = &message.spokes[0];
        assert_eq!(p.angle, 1000);
        assert_eq!(p.bearing, Some(1500));
        assert_eq!(p.range, 1852);
        assert_eq!(p.time, Some(1_700_000_000_000));
        assert_eq!(p.lat, Some(525_000_000_000_000_000));
        assert_eq!(p.lon, Some(-42_500_000_000_000_000));
        assert_eq!(p.data, vec![0x12, 0x34]);
    }

    #[test]
    fn unknown_bearing_and_position_are_absent() {
        let spoke = Spoke {
            angle: 0,
            bearing: None,
            range: 0,
            time: None,
            position: None,
            data: Vec::new(),
        };
        let p = spoke.to_protobuf();
        assert_eq!(p.bearing, None);
        assert_eq!(p.lat, None);
        assert_eq!(p.lon, None);

        let bytes = to_radar_message_bytes(1, &[spoke]).unwrap();
        let decoded = RadarMessage::parse_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.spokes.len(), 1);
    }
}

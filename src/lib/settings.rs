use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Copy,
    Clone,
    Debug,
    EnumIter,
    EnumString,
    IntoStaticStr,
    EnumCount,
)]
#[strum(ascii_case_insensitive, serialize_all = "camelCase")]
// Ordered as a radar page on an MFD would show them
pub enum ControlId {
    Range,
    Gain,
    Sea,
    Rain,
    InterferenceRejection,
    LocalInterferenceRejection,
    SideLobeSuppression,
    NoiseRejection,
    TargetBoost,
    TargetExpansion,
    TargetSeparation,
    ScanSpeed,
    BearingAlignment,
    AntennaHeight,
    OperatingHours,
}

impl Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = self.into();

        write!(f, "{}", s)
    }
}

impl Serialize for ControlId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.into())
    }
}

impl ControlId {
    pub fn units(&self) -> Units {
        match self {
            ControlId::Range | ControlId::AntennaHeight => Units::Meters,
            ControlId::BearingAlignment => Units::Degrees,
            ControlId::OperatingHours => Units::Hours,
            ControlId::Gain
            | ControlId::Sea
            | ControlId::Rain
            | ControlId::SideLobeSuppression => Units::Percent,
            _ => Units::None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Units {
    #[serde(rename = "")]
    None,
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "deg")]
    Degrees,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "%")]
    Percent,
}

/// How a radar runs a control by itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoMode {
    Auto,
    Harbour,
    Offshore,
}

/// The last value the radar reported for a control.
///
/// `raw` is what was on the wire, `value` is what a user would see: for the
/// percentage controls the 0..255 raw range scaled to 0..100.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlValue {
    pub raw: i32,
    pub value: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto: Option<AutoMode>,
}

impl ControlValue {
    pub fn new(raw: i32) -> ControlValue {
        ControlValue {
            raw,
            value: raw,
            auto: None,
        }
    }

    /// A value that the radar reports in other units than the user sees
    pub fn scaled(raw: i32, value: i32) -> ControlValue {
        ControlValue {
            raw,
            value,
            auto: None,
        }
    }

    pub fn percentage(raw: u8) -> ControlValue {
        ControlValue {
            raw: raw as i32,
            value: normalize(raw),
            auto: None,
        }
    }

    pub fn with_auto(mut self, auto: Option<AutoMode>) -> ControlValue {
        self.auto = auto;
        self
    }

    pub fn is_auto(&self) -> bool {
        self.auto.is_some()
    }
}

impl Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.auto {
            Some(auto) => write!(f, "{} ({:?})", self.value, auto),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Scale 0..255 to 0..100, rounding to the nearest integer.
pub fn normalize(raw: u8) -> i32 {
    // 255 is odd so there never is an exact half to break a tie on
    (raw as i32 * 100 + 127) / 255
}

/// All controls a radar has reported so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Controls {
    #[serde(flatten)]
    values: BTreeMap<ControlId, ControlValue>,
}

impl Controls {
    pub fn get(&self, id: ControlId) -> Option<ControlValue> {
        self.values.get(&id).copied()
    }

    /// Store a new value, returns true if it differs from the previous one.
    pub fn set(&mut self, id: ControlId, value: ControlValue) -> bool {
        match self.values.insert(id, value) {
            Some(old) if old == value => false,
            _ => {
                log::trace!("Control '{}' new value {} {:?}", id, value, id.units());
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ControlId, &ControlValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn normalize_rounds_to_nearest() {
        assert_eq!(normalize(0), 0);
        assert_eq!(normalize(1), 0);
        assert_eq!(normalize(2), 1);
        assert_eq!(normalize(127), 50);
        assert_eq!(normalize(128), 50);
        assert_eq!(normalize(191), 75);
        assert_eq!(normalize(254), 100);
        assert_eq!(normalize(255), 100);

        for raw in 0..=255u8 {
            let exact = raw as f64 * 100. / 255.;
            assert_eq!(normalize(raw), exact.round() as i32, "raw {}", raw);
        }
    }

    #[test]
    fn set_reports_changes() {
        let mut controls = Controls::default();

        assert!(controls.set(ControlId::Gain, ControlValue::percentage(128)));
        assert!(!controls.set(ControlId::Gain, ControlValue::percentage(128)));
        assert!(controls.set(
            ControlId::Gain,
            ControlValue::percentage(128).with_auto(Some(AutoMode::Auto))
        ));
        assert_eq!(controls.len(), 1);
        assert!(controls.get(ControlId::Gain).unwrap().is_auto());
        assert_eq!(controls.get(ControlId::Sea), None);
    }

    #[test]
    fn control_names() {
        assert_eq!(ControlId::SideLobeSuppression.to_string(), "sideLobeSuppression");
        assert_eq!(ControlId::from_str("scanspeed").unwrap(), ControlId::ScanSpeed);
        assert_eq!(ControlId::iter().count(), ControlId::COUNT);
    }

    #[test]
    fn serialize_as_map() {
        let mut controls = Controls::default();
        controls.set(ControlId::Range, ControlValue::new(1500));
        controls.set(
            ControlId::Sea,
            ControlValue::percentage(0).with_auto(Some(AutoMode::Harbour)),
        );

        let json = serde_json::to_string(&controls).unwrap();
        assert_eq!(
            json,
            r#"{"range":{"raw":1500,"value":1500},"sea":{"raw":0,"value":0,"auto":"harbour"}}"#
        );
    }
}

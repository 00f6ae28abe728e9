use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use crate::values::extract_decimal;
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const SENSOR_MULTILEVEL_GET: u8 = 0x04;
const SENSOR_MULTILEVEL_REPORT: u8 = 0x05;

/// (sensor type, label, units by scale bits)
const SENSOR_TYPES: &[(u8, &str, [&str; 4])] = &[
    (0x01, "Temperature", ["C", "F", "", ""]),
    (0x02, "General", ["%", "", "", ""]),
    (0x03, "Luminance", ["%", "lux", "", ""]),
    (0x04, "Power", ["W", "BTU/h", "", ""]),
    (0x05, "Relative Humidity", ["%", "g/m3", "", ""]),
    (0x06, "Velocity", ["m/s", "mph", "", ""]),
    (0x07, "Direction", ["deg", "", "", ""]),
    (0x08, "Atmospheric Pressure", ["kPa", "inHg", "", ""]),
    (0x09, "Barometric Pressure", ["kPa", "inHg", "", ""]),
    (0x0b, "Dew Point", ["C", "F", "", ""]),
    (0x1a, "Ultraviolet", ["UV index", "", "", ""]),
    (0x1b, "Weight", ["kg", "lb", "", ""]),
];

fn sensor_label(sensor_type: u8) -> String {
    SENSOR_TYPES
        .iter()
        .find(|(id, ..)| *id == sensor_type)
        .map(|(_, label, _)| (*label).to_owned())
        .unwrap_or_else(|| format!("Sensor type {}", sensor_type))
}

fn sensor_units(sensor_type: u8, scale: u8) -> String {
    SENSOR_TYPES
        .iter()
        .find(|(id, ..)| *id == sensor_type)
        .map(|(.., units)| units[scale as usize & 0x03].to_owned())
        .unwrap_or_default()
}

/// Multilevel sensor readings: one decimal value per reported sensor type,
/// with the wire precision preserved exactly.
#[derive(Debug, Default)]
pub struct SensorMultilevelCc {
    info: CcInfo,
}

impl SensorMultilevelCc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandClass for SensorMultilevelCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::MultilevelSensor as u8
    }

    fn name(&self) -> &'static str {
        "SensorMultilevel"
    }

    fn info(&self) -> &CcInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut CcInfo {
        &mut self.info
    }

    fn handle_msg(
        &mut self,
        ctx: &mut CcContext,
        cmd: u8,
        payload: &[u8],
        instance: u8,
    ) -> Result<Disposition, CcError> {
        if cmd != SENSOR_MULTILEVEL_REPORT {
            return Ok(Disposition::NotHandled);
        }
        let Some(&sensor_type) = payload.first() else {
            return Err(CcError::Malformed("sensor report without type".into()));
        };
        let (wire_value, _) = extract_decimal(&payload[1..])?;

        // One value per sensor type, the type doubling as the index
        let id = ctx.value_id(
            ValueGenre::User,
            self.cc_id(),
            instance,
            sensor_type,
            ValueType::Decimal,
        );
        let metadata = ValueMetadata {
            label: sensor_label(sensor_type),
            units: sensor_units(sensor_type, wire_value.scale),
            read_only: true,
            ..Default::default()
        };
        ctx.commit_report(id, metadata, Value::Decimal(wire_value.decimal));

        Ok(Disposition::Consumed)
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Dynamic => vec![
                OutgoingCc::new(vec![self.cc_id(), SENSOR_MULTILEVEL_GET])
                    .expecting(self.cc_id(), SENSOR_MULTILEVEL_REPORT)
                    .for_instance(instance),
            ],
            _ => Vec::new(),
        }
    }

    fn request_value(&self, _index: u8, instance: u8) -> Option<OutgoingCc> {
        // A v1 Get reports the node's default sensor type
        Some(
            OutgoingCc::new(vec![self.cc_id(), SENSOR_MULTILEVEL_GET])
                .expecting(self.cc_id(), SENSOR_MULTILEVEL_REPORT)
                .for_instance(instance),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;
    use zw_core::value_store::ValueEvent;
    use zw_core::values::Decimal;

    #[test]
    fn test_temperature_report() {
        let mut harness = Harness::new();
        let mut cc = SensorMultilevelCc::new();

        // type 01 (temperature), precision 1 / scale 0 (C) / size 2, 42 -> "4.2 C"
        let frame = hex::decode("310501 22002a".replace(' ', "")).unwrap();
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(disposition, Disposition::Consumed);

        let id = harness.store.ids().next().copied().unwrap();
        assert_eq!(id.index(), 0x01);
        let stored = harness.store.get(&id).unwrap();
        assert_eq!(stored.metadata.label, "Temperature");
        assert_eq!(stored.metadata.units, "C");
        assert_eq!(
            stored.current,
            Some(Value::Decimal(Decimal::new(1, 2, 42)))
        );
        assert_eq!(
            stored.current.as_ref().map(|v| match v {
                Value::Decimal(d) => d.to_string(),
                _ => unreachable!(),
            }),
            Some("4.2".to_owned())
        );
    }

    #[test]
    fn test_same_report_twice_is_refresh() {
        let mut harness = Harness::new();
        let mut cc = SensorMultilevelCc::new();
        let frame = hex::decode("31050122002a").unwrap();

        harness.handle(&mut cc, &frame).unwrap();
        harness.handle(&mut cc, &frame).unwrap();

        assert!(matches!(harness.events[1], ValueEvent::Changed(_)));
        assert!(matches!(harness.events[2], ValueEvent::Refreshed(_)));
    }

    #[test]
    fn test_truncated_report_rejected() {
        let mut harness = Harness::new();
        let mut cc = SensorMultilevelCc::new();
        let frame = hex::decode("31050124").unwrap();
        assert!(harness.handle(&mut cc, &frame).is_err());
    }
}

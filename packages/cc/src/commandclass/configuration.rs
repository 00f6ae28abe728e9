use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc,
};
use crate::values::{encode_int, extract_int};
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const CONFIGURATION_SET: u8 = 0x04;
const CONFIGURATION_GET: u8 = 0x05;
const CONFIGURATION_REPORT: u8 = 0x06;

/// Device configuration parameters: numbered, sized 1/2/4 bytes. Which
/// parameters exist is device-specific, so values appear as reports come
/// in or as the embedder requests known parameters.
#[derive(Debug, Default)]
pub struct ConfigurationCc {
    info: CcInfo,
}

impl ConfigurationCc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param_get(&self, param: u8) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), CONFIGURATION_GET, param])
            .expecting(self.cc_id(), CONFIGURATION_REPORT)
    }

    pub fn param_set(&self, param: u8, value: i64, size: u8) -> Result<OutgoingCc, CcError> {
        if !matches!(size, 1 | 2 | 4) {
            return Err(CcError::InvalidValue(format!(
                "config size must be 1, 2 or 4, not {}",
                size
            )));
        }
        let mut cc_bytes = vec![self.cc_id(), CONFIGURATION_SET, param, size];
        cc_bytes.extend_from_slice(&encode_int(value, size as usize));
        Ok(OutgoingCc::new(cc_bytes))
    }

    fn value_type_for(size: u8) -> ValueType {
        match size {
            1 => ValueType::Byte,
            2 => ValueType::Short,
            _ => ValueType::Int,
        }
    }
}

impl CommandClass for ConfigurationCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::Configuration as u8
    }

    fn name(&self) -> &'static str {
        "Configuration"
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
        if cmd != CONFIGURATION_REPORT {
            return Ok(Disposition::NotHandled);
        }
        let (Some(&param), Some(&size_byte)) = (payload.first(), payload.get(1)) else {
            return Err(CcError::Malformed("config report too short".into()));
        };
        let size = (size_byte & 0x07) as usize;
        if !matches!(size, 1 | 2 | 4) {
            return Err(CcError::Malformed(format!(
                "invalid config size {}",
                size
            )));
        }
        let raw = extract_int(&payload[2..], size)?;

        let value = match size {
            1 => Value::Byte(raw as u8),
            2 => Value::Short(raw as i16),
            _ => Value::Int(raw as i32),
        };
        let id = ctx.value_id(
            ValueGenre::Config,
            self.cc_id(),
            instance,
            param,
            Self::value_type_for(size as u8),
        );
        ctx.commit_report(
            id,
            ValueMetadata {
                label: format!("Parameter {}", param),
                ..Default::default()
            },
            value,
        );
        Ok(Disposition::Consumed)
    }

    fn request_value(&self, index: u8, _instance: u8) -> Option<OutgoingCc> {
        Some(self.param_get(index))
    }

    fn set_value(&self, value_id: &ValueId, value: &Value) -> Result<Vec<OutgoingCc>, CcError> {
        let (raw, size) = match value {
            Value::Byte(b) => (*b as i64, 1),
            Value::Short(s) => (*s as i64, 2),
            Value::Int(i) => (*i as i64, 4),
            _ => {
                return Err(CcError::InvalidValue(
                    "config parameters are integers".into(),
                ));
            }
        };
        Ok(vec![self.param_set(value_id.index(), raw, size)?])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_report_sizes() {
        let mut harness = Harness::new();
        let mut cc = ConfigurationCc::new();

        // param 3, size 2, value 0x0102
        harness
            .handle(&mut cc, &hex::decode("700603020102").unwrap())
            .unwrap();
        let id = harness.store.ids().next().copied().unwrap();
        assert_eq!(id.genre(), ValueGenre::Config);
        assert_eq!(id.index(), 3);
        assert_eq!(
            harness.store.get(&id).unwrap().current,
            Some(Value::Short(0x0102))
        );
    }

    #[test]
    fn test_set_encodes_size() {
        let cc = ConfigurationCc::new();
        let out = cc.param_set(7, 0x01020304, 4).unwrap();
        assert_eq!(
            out.cc_bytes,
            vec![0x70, CONFIGURATION_SET, 7, 4, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_invalid_size_rejected() {
        let cc = ConfigurationCc::new();
        assert!(cc.param_set(7, 1, 3).is_err());
    }
}

use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use zw_core::prelude::*;

const MANUFACTURER_SPECIFIC_GET: u8 = 0x04;
const MANUFACTURER_SPECIFIC_REPORT: u8 = 0x05;

/// Identifies the device: manufacturer, product type and product id
#[derive(Debug, Default)]
pub struct ManufacturerSpecificCc {
    info: CcInfo,
}

impl ManufacturerSpecificCc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandClass for ManufacturerSpecificCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::ManufacturerSpecific as u8
    }

    fn name(&self) -> &'static str {
        "ManufacturerSpecific"
    }

    fn info(&self) -> &CcInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut CcInfo {
        &mut self.info
    }

    fn handle_msg(
        &mut self,
        _ctx: &mut CcContext,
        cmd: u8,
        payload: &[u8],
        _instance: u8,
    ) -> Result<Disposition, CcError> {
        if cmd != MANUFACTURER_SPECIFIC_REPORT {
            return Ok(Disposition::NotHandled);
        }
        if payload.len() < 6 {
            return Err(CcError::Malformed(
                "manufacturer report too short".into(),
            ));
        }
        Ok(Disposition::ManufacturerInfo {
            manufacturer_id: u16::from_be_bytes([payload[0], payload[1]]),
            product_type: u16::from_be_bytes([payload[2], payload[3]]),
            product_id: u16::from_be_bytes([payload[4], payload[5]]),
        })
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Static => vec![
                OutgoingCc::new(vec![self.cc_id(), MANUFACTURER_SPECIFIC_GET])
                    .expecting(self.cc_id(), MANUFACTURER_SPECIFIC_REPORT)
                    .for_instance(instance),
            ],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_report() {
        let mut harness = Harness::new();
        let mut cc = ManufacturerSpecificCc::new();

        let frame = hex::decode("7205 0086 0002 0064".replace(' ', "")).unwrap();
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::ManufacturerInfo {
                manufacturer_id: 0x0086,
                product_type: 0x0002,
                product_id: 0x0064,
            }
        );
    }
}

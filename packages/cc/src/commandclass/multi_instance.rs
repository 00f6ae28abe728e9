use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc,
};
use zw_core::prelude::*;

// Version 1: multi instance
const MULTI_INSTANCE_GET: u8 = 0x04;
const MULTI_INSTANCE_REPORT: u8 = 0x05;
const MULTI_INSTANCE_ENCAP: u8 = 0x06;
// Version 2+: multi channel
const MULTI_CHANNEL_END_POINT_GET: u8 = 0x07;
const MULTI_CHANNEL_END_POINT_REPORT: u8 = 0x08;
const MULTI_CHANNEL_CAPABILITY_GET: u8 = 0x09;
const MULTI_CHANNEL_ENCAP: u8 = 0x0d;

/// Multi-instance (v1) / multi-channel (v2) discovery and encapsulation.
/// Instances address logical sub-devices; v2 renames them endpoints and
/// adds a source address to the encapsulation.
#[derive(Debug, Default)]
pub struct MultiInstanceCc {
    info: CcInfo,
}

impl MultiInstanceCc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks how many instances of the given class the node exposes (v1)
    pub fn instance_count_get(&self, cc_id: u8) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), MULTI_INSTANCE_GET, cc_id])
            .expecting(self.cc_id(), MULTI_INSTANCE_REPORT)
    }

    /// Asks how many endpoints the node exposes (v2)
    pub fn endpoint_get(&self) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), MULTI_CHANNEL_END_POINT_GET])
            .expecting(self.cc_id(), MULTI_CHANNEL_END_POINT_REPORT)
    }

    /// Asks which classes an endpoint supports (v2)
    pub fn capability_get(&self, endpoint: u8) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), MULTI_CHANNEL_CAPABILITY_GET, endpoint])
    }

    /// Wraps an inner frame for the given instance, v1 style
    pub fn encapsulate_v1(instance: u8, inner: &[u8]) -> Vec<u8> {
        let mut out = vec![
            CommandClasses::MultiInstance as u8,
            MULTI_INSTANCE_ENCAP,
            instance,
        ];
        out.extend_from_slice(inner);
        out
    }

    /// Wraps an inner frame for the given endpoint, v2 style
    /// (source endpoint 1 = the root device)
    pub fn encapsulate_v2(endpoint: u8, inner: &[u8]) -> Vec<u8> {
        let mut out = vec![
            CommandClasses::MultiInstance as u8,
            MULTI_CHANNEL_ENCAP,
            0x01,
            endpoint,
        ];
        out.extend_from_slice(inner);
        out
    }
}

impl CommandClass for MultiInstanceCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::MultiInstance as u8
    }

    fn name(&self) -> &'static str {
        "MultiInstance"
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
        match cmd {
            MULTI_INSTANCE_REPORT => {
                let (Some(&cc_id), Some(&count)) = (payload.first(), payload.get(1)) else {
                    return Err(CcError::Malformed(
                        "multi instance report too short".into(),
                    ));
                };
                Ok(Disposition::InstanceCount {
                    cc_id,
                    // The low 7 bits carry the count
                    count: (count & 0x7f).max(1),
                })
            }
            MULTI_INSTANCE_ENCAP => {
                let Some(&instance) = payload.first() else {
                    return Err(CcError::Malformed("encap without instance".into()));
                };
                if payload.len() < 2 {
                    return Err(CcError::Malformed("encap without inner frame".into()));
                }
                Ok(Disposition::Encapsulated {
                    instance,
                    inner: payload[1..].to_vec(),
                })
            }
            MULTI_CHANNEL_END_POINT_REPORT => {
                let Some(&count) = payload.get(1) else {
                    return Err(CcError::Malformed("endpoint report too short".into()));
                };
                Ok(Disposition::EndpointCount {
                    count: count & 0x7f,
                })
            }
            MULTI_CHANNEL_ENCAP => {
                // source endpoint, destination, then the inner frame
                let Some(&source) = payload.first() else {
                    return Err(CcError::Malformed("encap without source".into()));
                };
                if payload.len() < 3 {
                    return Err(CcError::Malformed("encap without inner frame".into()));
                }
                Ok(Disposition::Encapsulated {
                    instance: source & 0x7f,
                    inner: payload[2..].to_vec(),
                })
            }
            _ => Ok(Disposition::NotHandled),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_v1_encap_roundtrip() {
        let inner = [0x25, 0x03, 0xff];
        let wrapped = MultiInstanceCc::encapsulate_v1(2, &inner);
        assert_eq!(wrapped, vec![0x60, 0x06, 0x02, 0x25, 0x03, 0xff]);

        let mut harness = Harness::new();
        let mut cc = MultiInstanceCc::new();
        let disposition = harness.handle(&mut cc, &wrapped).unwrap();
        assert_eq!(
            disposition,
            Disposition::Encapsulated {
                instance: 2,
                inner: inner.to_vec()
            }
        );
    }

    #[test]
    fn test_v2_encap() {
        // src endpoint 3, dst 1, inner Basic report
        let frame = [0x60, 0x0d, 0x03, 0x01, 0x20, 0x03, 0x63];
        let mut harness = Harness::new();
        let mut cc = MultiInstanceCc::new();
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::Encapsulated {
                instance: 3,
                inner: vec![0x20, 0x03, 0x63]
            }
        );
    }

    #[test]
    fn test_instance_report() {
        let frame = [0x60, 0x05, 0x25, 0x03];
        let mut harness = Harness::new();
        let mut cc = MultiInstanceCc::new();
        assert_eq!(
            harness.handle(&mut cc, &frame).unwrap(),
            Disposition::InstanceCount {
                cc_id: 0x25,
                count: 3
            }
        );
    }
}

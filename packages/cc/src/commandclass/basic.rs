use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const BASIC_SET: u8 = 0x01;
const BASIC_GET: u8 = 0x02;
const BASIC_REPORT: u8 = 0x03;

const INDEX_VALUE: u8 = 0;

/// The lowest common denominator every device maps onto: a single byte,
/// 0x00 = off, 0xff = on, 1..=99 = level.
#[derive(Debug, Default)]
pub struct BasicCc {
    info: CcInfo,
}

impl BasicCc {
    pub fn new() -> Self {
        Self::default()
    }

    fn value_id(&self, ctx: &CcContext, instance: u8) -> ValueId {
        ctx.value_id(
            ValueGenre::Basic,
            self.cc_id(),
            instance,
            INDEX_VALUE,
            ValueType::Byte,
        )
    }

    fn metadata() -> ValueMetadata {
        ValueMetadata {
            label: "Basic".into(),
            max: Some(255),
            min: Some(0),
            ..Default::default()
        }
    }
}

impl CommandClass for BasicCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::Basic as u8
    }

    fn name(&self) -> &'static str {
        "Basic"
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
        match cmd {
            BASIC_REPORT => {
                let Some(&level) = payload.first() else {
                    return Err(CcError::Malformed("Basic report without level".into()));
                };
                let id = self.value_id(ctx, instance);
                ctx.commit_report(id, Self::metadata(), Value::Byte(level));
                Ok(Disposition::Consumed)
            }
            // An unsolicited Set is how some devices report events
            BASIC_SET => {
                let Some(&level) = payload.first() else {
                    return Err(CcError::Malformed("Basic set without level".into()));
                };
                Ok(Disposition::NodeEvent { event: level })
            }
            _ => Ok(Disposition::NotHandled),
        }
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Dynamic => vec![
                OutgoingCc::new(vec![self.cc_id(), BASIC_GET])
                    .expecting(self.cc_id(), BASIC_REPORT)
                    .for_instance(instance),
            ],
            _ => Vec::new(),
        }
    }

    fn request_value(&self, index: u8, instance: u8) -> Option<OutgoingCc> {
        (index == INDEX_VALUE).then(|| {
            OutgoingCc::new(vec![self.cc_id(), BASIC_GET])
                .expecting(self.cc_id(), BASIC_REPORT)
                .for_instance(instance)
        })
    }

    fn set_value(&self, value_id: &ValueId, value: &Value) -> Result<Vec<OutgoingCc>, CcError> {
        let Value::Byte(level) = value else {
            return Err(CcError::InvalidValue("Basic takes a byte".into()));
        };
        Ok(vec![
            OutgoingCc::new(vec![self.cc_id(), BASIC_SET, *level])
                .for_instance(value_id.instance()),
        ])
    }

    fn create_vars(&self, ctx: &mut CcContext, instance: u8) {
        let id = self.value_id(ctx, instance);
        ctx.create_value(id, Self::metadata());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;
    use zw_core::value_store::ValueEvent;

    #[test]
    fn test_report_updates_value() {
        let mut harness = Harness::new();
        let mut cc = BasicCc::new();

        let disposition = harness.handle(&mut cc, &[0x20, BASIC_REPORT, 0x63]).unwrap();
        assert_eq!(disposition, Disposition::Consumed);
        assert_eq!(harness.events.len(), 2); // Added + Changed
        assert!(matches!(harness.events[1], ValueEvent::Changed(_)));
    }

    #[test]
    fn test_unsolicited_set_is_an_event() {
        let mut harness = Harness::new();
        let mut cc = BasicCc::new();

        let disposition = harness.handle(&mut cc, &[0x20, BASIC_SET, 0xff]).unwrap();
        assert_eq!(disposition, Disposition::NodeEvent { event: 0xff });
        // No value traffic for events
        assert!(harness.events.is_empty());
    }
}

use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const SWITCH_BINARY_SET: u8 = 0x01;
const SWITCH_BINARY_GET: u8 = 0x02;
const SWITCH_BINARY_REPORT: u8 = 0x03;

const INDEX_CURRENT: u8 = 0;
const INDEX_DURATION: u8 = 2;

#[derive(Debug, Default)]
pub struct BinarySwitchCc {
    info: CcInfo,
}

impl BinarySwitchCc {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_value_id(&self, ctx: &CcContext, instance: u8) -> ValueId {
        ctx.value_id(
            ValueGenre::User,
            self.cc_id(),
            instance,
            INDEX_CURRENT,
            ValueType::Bool,
        )
    }

    fn current_metadata() -> ValueMetadata {
        ValueMetadata {
            label: "Switch".into(),
            ..Default::default()
        }
    }
}

impl CommandClass for BinarySwitchCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::BinarySwitch as u8
    }

    fn name(&self) -> &'static str {
        "BinarySwitch"
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
        if cmd != SWITCH_BINARY_REPORT {
            return Ok(Disposition::NotHandled);
        }
        let Some(&state) = payload.first() else {
            return Err(CcError::Malformed("switch report without state".into()));
        };

        let id = self.current_value_id(ctx, instance);
        ctx.commit_report(id, Self::current_metadata(), Value::Bool(state != 0));

        // Version 2 reports append the remaining transition duration
        if self.info.version >= 2 {
            if let Some(&duration) = payload.get(2) {
                let id = ctx.value_id(
                    ValueGenre::User,
                    self.cc_id(),
                    instance,
                    INDEX_DURATION,
                    ValueType::Byte,
                );
                ctx.commit_report(
                    id,
                    ValueMetadata {
                        label: "Remaining duration".into(),
                        read_only: true,
                        ..Default::default()
                    },
                    Value::Byte(duration),
                );
            }
        }

        Ok(Disposition::Consumed)
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Dynamic => vec![
                OutgoingCc::new(vec![self.cc_id(), SWITCH_BINARY_GET])
                    .expecting(self.cc_id(), SWITCH_BINARY_REPORT)
                    .for_instance(instance),
            ],
            _ => Vec::new(),
        }
    }

    fn request_value(&self, index: u8, instance: u8) -> Option<OutgoingCc> {
        (index == INDEX_CURRENT).then(|| {
            OutgoingCc::new(vec![self.cc_id(), SWITCH_BINARY_GET])
                .expecting(self.cc_id(), SWITCH_BINARY_REPORT)
                .for_instance(instance)
        })
    }

    fn set_value(&self, value_id: &ValueId, value: &Value) -> Result<Vec<OutgoingCc>, CcError> {
        let Value::Bool(on) = value else {
            return Err(CcError::InvalidValue("BinarySwitch takes a bool".into()));
        };
        let state = if *on { 0xff } else { 0x00 };
        Ok(vec![
            OutgoingCc::new(vec![self.cc_id(), SWITCH_BINARY_SET, state])
                .for_instance(value_id.instance()),
        ])
    }

    fn create_vars(&self, ctx: &mut CcContext, instance: u8) {
        let id = self.current_value_id(ctx, instance);
        ctx.create_value(id, Self::current_metadata());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    fn value_id() -> ValueId {
        ValueId::new(
            HomeId::new(1),
            NodeId::new(5),
            ValueGenre::User,
            0x25,
            1,
            0,
            ValueType::Bool,
        )
    }

    #[test]
    fn test_set_value_encodes_0xff() {
        let cc = BinarySwitchCc::new();
        let out = cc.set_value(&value_id(), &Value::Bool(true)).unwrap();
        assert_eq!(out[0].cc_bytes, vec![0x25, SWITCH_BINARY_SET, 0xff]);

        let out = cc.set_value(&value_id(), &Value::Bool(false)).unwrap();
        assert_eq!(out[0].cc_bytes, vec![0x25, SWITCH_BINARY_SET, 0x00]);
    }

    #[test]
    fn test_report() {
        let mut harness = Harness::new();
        let mut cc = BinarySwitchCc::new();
        let disposition = harness
            .handle(&mut cc, &[0x25, SWITCH_BINARY_REPORT, 0xff])
            .unwrap();
        assert_eq!(disposition, Disposition::Consumed);
        let id = harness.store.ids().next().copied().unwrap();
        assert_eq!(
            harness.store.get(&id).unwrap().current,
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn test_wrong_type_rejected() {
        let cc = BinarySwitchCc::new();
        assert!(matches!(
            cc.set_value(&value_id(), &Value::Byte(1)),
            Err(CcError::InvalidValue(_))
        ));
    }
}

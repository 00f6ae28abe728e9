use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use crate::values::{encode_int, extract_int};
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const WAKE_UP_INTERVAL_SET: u8 = 0x04;
const WAKE_UP_INTERVAL_GET: u8 = 0x05;
const WAKE_UP_INTERVAL_REPORT: u8 = 0x06;
const WAKE_UP_NOTIFICATION: u8 = 0x07;
const WAKE_UP_NO_MORE_INFORMATION: u8 = 0x08;

const INDEX_INTERVAL: u8 = 0;

/// Battery devices sleep and only listen for a short window after sending
/// a wake-up notification. This class manages the wake-up interval and the
/// frames that bracket the awake window.
#[derive(Debug, Default)]
pub struct WakeUpCc {
    info: CcInfo,
    /// Set when a poll came due while the node slept
    pub poll_pending: bool,
}

impl WakeUpCc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tells the node it may go back to sleep. Sent after its queue has
    /// been drained.
    pub fn no_more_information() -> OutgoingCc {
        OutgoingCc::new(vec![
            CommandClasses::WakeUp as u8,
            WAKE_UP_NO_MORE_INFORMATION,
        ])
    }

    /// Configures the wake-up interval and the node to notify (us)
    pub fn interval_set(&self, seconds: u32, target: NodeId) -> OutgoingCc {
        let mut cc_bytes = vec![self.cc_id(), WAKE_UP_INTERVAL_SET];
        cc_bytes.extend_from_slice(&encode_int(seconds as i64, 3));
        cc_bytes.push(target.into());
        OutgoingCc::new(cc_bytes)
    }

    fn interval_value_id(&self, ctx: &CcContext, instance: u8) -> ValueId {
        ctx.value_id(
            ValueGenre::System,
            self.cc_id(),
            instance,
            INDEX_INTERVAL,
            ValueType::Int,
        )
    }

    fn interval_metadata() -> ValueMetadata {
        ValueMetadata {
            label: "Wake-up Interval".into(),
            units: "seconds".into(),
            ..Default::default()
        }
    }
}

impl CommandClass for WakeUpCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::WakeUp as u8
    }

    fn name(&self) -> &'static str {
        "WakeUp"
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
            WAKE_UP_NOTIFICATION => Ok(Disposition::WakeUpNotification),
            WAKE_UP_INTERVAL_REPORT => {
                // 3-byte interval in seconds, then the target node
                let seconds = extract_int(payload, 3)?;
                let id = self.interval_value_id(ctx, instance);
                ctx.commit_report(
                    id,
                    Self::interval_metadata(),
                    Value::Int(seconds as i32),
                );
                Ok(Disposition::Consumed)
            }
            _ => Ok(Disposition::NotHandled),
        }
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Static => vec![
                OutgoingCc::new(vec![self.cc_id(), WAKE_UP_INTERVAL_GET])
                    .expecting(self.cc_id(), WAKE_UP_INTERVAL_REPORT)
                    .for_instance(instance),
            ],
            _ => Vec::new(),
        }
    }

    fn set_value(&self, value_id: &ValueId, value: &Value) -> Result<Vec<OutgoingCc>, CcError> {
        let Value::Int(seconds) = value else {
            return Err(CcError::InvalidValue(
                "wake-up interval takes seconds".into(),
            ));
        };
        if *seconds < 0 {
            return Err(CcError::InvalidValue(
                "wake-up interval cannot be negative".into(),
            ));
        }
        // The notification target is filled in by the driver (own node id)
        Ok(vec![
            self.interval_set(*seconds as u32, NodeId::unspecified())
                .for_instance(value_id.instance()),
        ])
    }

    fn create_vars(&self, ctx: &mut CcContext, instance: u8) {
        let id = self.interval_value_id(ctx, instance);
        ctx.create_value(id, Self::interval_metadata());
    }

    fn as_wake_up_mut(&mut self) -> Option<&mut WakeUpCc> {
        Some(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_notification() {
        let mut harness = Harness::new();
        let mut cc = WakeUpCc::new();

        let disposition = harness
            .handle(&mut cc, &[0x84, WAKE_UP_NOTIFICATION])
            .unwrap();
        assert_eq!(disposition, Disposition::WakeUpNotification);
    }

    #[test]
    fn test_interval_report() {
        let mut harness = Harness::new();
        let mut cc = WakeUpCc::new();

        // 0x000e10 = 3600 seconds, target node 1
        let frame = hex::decode("8406000e1001").unwrap();
        harness.handle(&mut cc, &frame).unwrap();

        let id = harness.store.ids().next().copied().unwrap();
        assert_eq!(
            harness.store.get(&id).unwrap().current,
            Some(Value::Int(3600))
        );
    }

    #[test]
    fn test_no_more_information_bytes() {
        assert_eq!(
            WakeUpCc::no_more_information().cc_bytes,
            vec![0x84, 0x08]
        );
    }
}

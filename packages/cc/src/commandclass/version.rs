use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use zw_core::prelude::*;
use zw_core::value_store::ValueMetadata;

const VERSION_GET: u8 = 0x11;
const VERSION_REPORT: u8 = 0x12;
const VERSION_COMMAND_CLASS_GET: u8 = 0x13;
const VERSION_COMMAND_CLASS_REPORT: u8 = 0x14;

const INDEX_LIBRARY: u8 = 0;
const INDEX_PROTOCOL: u8 = 1;
const INDEX_APPLICATION: u8 = 2;

/// Negotiates per-class versions and reports the node's firmware versions
#[derive(Debug, Default)]
pub struct VersionCc {
    info: CcInfo,
}

impl VersionCc {
    pub fn new() -> Self {
        Self::default()
    }

    /// The query for another class's version, issued during the Versions
    /// interview stage
    pub fn class_version_get(&self, cc_id: u8) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), VERSION_COMMAND_CLASS_GET, cc_id])
            .expecting(self.cc_id(), VERSION_COMMAND_CLASS_REPORT)
    }

    fn version_value(
        &self,
        ctx: &mut CcContext,
        instance: u8,
        index: u8,
        label: &str,
        text: String,
    ) {
        let id = ctx.value_id(
            ValueGenre::System,
            self.cc_id(),
            instance,
            index,
            ValueType::String,
        );
        ctx.commit_report(
            id,
            ValueMetadata {
                label: label.into(),
                read_only: true,
                ..Default::default()
            },
            Value::String(text),
        );
    }
}

impl CommandClass for VersionCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::Version as u8
    }

    fn name(&self) -> &'static str {
        "Version"
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
            VERSION_REPORT => {
                if payload.len() < 5 {
                    return Err(CcError::Malformed("version report too short".into()));
                }
                self.version_value(
                    ctx,
                    instance,
                    INDEX_LIBRARY,
                    "Library Version",
                    format!("{}", payload[0]),
                );
                self.version_value(
                    ctx,
                    instance,
                    INDEX_PROTOCOL,
                    "Protocol Version",
                    format!("{}.{:02}", payload[1], payload[2]),
                );
                self.version_value(
                    ctx,
                    instance,
                    INDEX_APPLICATION,
                    "Application Version",
                    format!("{}.{:02}", payload[3], payload[4]),
                );
                Ok(Disposition::Consumed)
            }
            VERSION_COMMAND_CLASS_REPORT => {
                let (Some(&cc_id), Some(&version)) = (payload.first(), payload.get(1)) else {
                    return Err(CcError::Malformed(
                        "class version report too short".into(),
                    ));
                };
                // A node reporting version 0 does not implement the class;
                // keep the default of 1
                let version = version.max(1);
                Ok(Disposition::ClassVersion { cc_id, version })
            }
            _ => Ok(Disposition::NotHandled),
        }
    }

    fn request_state(&self, kind: StateKind, instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Static => vec![
                OutgoingCc::new(vec![self.cc_id(), VERSION_GET])
                    .expecting(self.cc_id(), VERSION_REPORT)
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
    fn test_class_version_report() {
        let mut harness = Harness::new();
        let mut cc = VersionCc::new();

        let frame = [0x86, VERSION_COMMAND_CLASS_REPORT, 0x25, 0x02];
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::ClassVersion {
                cc_id: 0x25,
                version: 2
            }
        );
    }

    #[test]
    fn test_version_zero_clamped() {
        let mut harness = Harness::new();
        let mut cc = VersionCc::new();

        let frame = [0x86, VERSION_COMMAND_CLASS_REPORT, 0x25, 0x00];
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::ClassVersion {
                cc_id: 0x25,
                version: 1
            }
        );
    }

    #[test]
    fn test_version_report_creates_values() {
        let mut harness = Harness::new();
        let mut cc = VersionCc::new();

        let frame = [0x86, VERSION_REPORT, 0x06, 0x04, 0x05, 0x01, 0x02];
        harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(harness.store.len(), 3);
    }
}

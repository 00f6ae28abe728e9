use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition,
};
use zw_core::prelude::*;

const MULTI_CMD_ENCAP: u8 = 0x01;

/// Batches several commands into one frame, used mostly by battery
/// devices to make the most of their awake window.
#[derive(Debug, Default)]
pub struct MultiCmdCc {
    info: CcInfo,
}

impl MultiCmdCc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandClass for MultiCmdCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::MultiCmd as u8
    }

    fn name(&self) -> &'static str {
        "MultiCmd"
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
        if cmd != MULTI_CMD_ENCAP {
            return Ok(Disposition::NotHandled);
        }
        let Some(&count) = payload.first() else {
            return Err(CcError::Malformed("batch without count".into()));
        };

        // Each sub-frame is length-prefixed. A batch whose declared count
        // or lengths overrun the frame is dropped whole, never applied
        // partially.
        let mut frames = Vec::with_capacity(count as usize);
        let mut offset = 1usize;
        for index in 0..count {
            let Some(&len) = payload.get(offset) else {
                return Err(CcError::Malformed(format!(
                    "batch truncated at sub-frame {}",
                    index
                )));
            };
            let start = offset + 1;
            let end = start + len as usize;
            if len == 0 || end > payload.len() {
                return Err(CcError::Malformed(format!(
                    "sub-frame {} length {} exceeds batch",
                    index, len
                )));
            }
            frames.push(payload[start..end].to_vec());
            offset = end;
        }

        Ok(Disposition::Batch { frames })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_batch() {
        // Two sub-frames: a Basic report and a BinarySwitch report
        let frame = hex::decode("8f0102 03200363 032503ff".replace(' ', "")).unwrap();
        let mut harness = Harness::new();
        let mut cc = MultiCmdCc::new();
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::Batch {
                frames: vec![vec![0x20, 0x03, 0x63], vec![0x25, 0x03, 0xff]]
            }
        );
    }

    #[test]
    fn test_overrunning_batch_dropped_whole() {
        // Declared count 3, but only one complete sub-frame present
        let frame = hex::decode("8f010303200363").unwrap();
        let mut harness = Harness::new();
        let mut cc = MultiCmdCc::new();
        assert!(matches!(
            harness.handle(&mut cc, &frame),
            Err(CcError::Malformed(_))
        ));
    }

    #[test]
    fn test_length_overrun_dropped_whole() {
        // Sub-frame claims 9 bytes but only 3 follow
        let frame = hex::decode("8f010109200363").unwrap();
        let mut harness = Harness::new();
        let mut cc = MultiCmdCc::new();
        assert!(harness.handle(&mut cc, &frame).is_err());
    }
}

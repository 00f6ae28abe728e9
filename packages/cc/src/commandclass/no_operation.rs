use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc,
};
use zw_core::definitions::CommandClasses;

/// The empty frame used as a liveness probe. It carries no command byte
/// and no payload; delivery confirmation is the whole point.
#[derive(Debug, Default)]
pub struct NoOperationCc {
    info: CcInfo,
}

impl NoOperationCc {
    pub fn new() -> Self {
        Self::default()
    }

    /// The probe frame the driver sends to check a node is reachable
    pub fn ping() -> OutgoingCc {
        OutgoingCc::new(vec![CommandClasses::NoOperation as u8])
    }
}

impl CommandClass for NoOperationCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::NoOperation as u8
    }

    fn name(&self) -> &'static str {
        "NoOperation"
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
        _cmd: u8,
        _payload: &[u8],
        _instance: u8,
    ) -> Result<Disposition, CcError> {
        // Nothing to do; receiving one at all is unusual
        Ok(Disposition::Consumed)
    }
}

use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
use zw_core::prelude::*;

const ASSOCIATION_SET: u8 = 0x01;
const ASSOCIATION_GET: u8 = 0x02;
const ASSOCIATION_REPORT: u8 = 0x03;
const ASSOCIATION_REMOVE: u8 = 0x04;
const ASSOCIATION_GROUPINGS_GET: u8 = 0x05;
const ASSOCIATION_GROUPINGS_REPORT: u8 = 0x06;

/// Association groups: the lists of nodes a device notifies when
/// something happens. Group indices are 1-based.
#[derive(Debug, Default)]
pub struct AssociationCc {
    info: CcInfo,
}

impl AssociationCc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groupings_get(&self) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), ASSOCIATION_GROUPINGS_GET])
            .expecting(self.cc_id(), ASSOCIATION_GROUPINGS_REPORT)
    }

    pub fn group_get(&self, group_idx: u8) -> OutgoingCc {
        OutgoingCc::new(vec![self.cc_id(), ASSOCIATION_GET, group_idx])
            .expecting(self.cc_id(), ASSOCIATION_REPORT)
    }

    pub fn add(&self, group_idx: u8, node_id: NodeId) -> OutgoingCc {
        OutgoingCc::new(vec![
            self.cc_id(),
            ASSOCIATION_SET,
            group_idx,
            node_id.into(),
        ])
    }

    pub fn remove(&self, group_idx: u8, node_id: NodeId) -> OutgoingCc {
        OutgoingCc::new(vec![
            self.cc_id(),
            ASSOCIATION_REMOVE,
            group_idx,
            node_id.into(),
        ])
    }
}

impl CommandClass for AssociationCc {
    fn cc_id(&self) -> u8 {
        CommandClasses::Association as u8
    }

    fn name(&self) -> &'static str {
        "Association"
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
            ASSOCIATION_GROUPINGS_REPORT => {
                let Some(&count) = payload.first() else {
                    return Err(CcError::Malformed("groupings report empty".into()));
                };
                Ok(Disposition::GroupCount { count })
            }
            ASSOCIATION_REPORT => {
                if payload.len() < 3 {
                    return Err(CcError::Malformed("association report too short".into()));
                }
                // group, max nodes, reports to follow, then the members
                let group_idx = payload[0];
                let max_associations = payload[1];
                let node_ids = payload[3..].iter().map(|&id| NodeId::new(id)).collect();
                Ok(Disposition::GroupMembers {
                    group_idx,
                    max_associations,
                    node_ids,
                })
            }
            _ => Ok(Disposition::NotHandled),
        }
    }

    fn request_state(&self, kind: StateKind, _instance: u8) -> Vec<OutgoingCc> {
        match kind {
            StateKind::Static => vec![self.groupings_get()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commandclass::test_util::Harness;

    #[test]
    fn test_group_members_report() {
        let mut harness = Harness::new();
        let mut cc = AssociationCc::new();

        // group 1, max 5, 0 to follow, members 1 and 9
        let frame = hex::decode("85030105000109").unwrap();
        let disposition = harness.handle(&mut cc, &frame).unwrap();
        assert_eq!(
            disposition,
            Disposition::GroupMembers {
                group_idx: 1,
                max_associations: 5,
                node_ids: vec![NodeId::new(1), NodeId::new(9)],
            }
        );
    }

    #[test]
    fn test_groupings_report() {
        let mut harness = Harness::new();
        let mut cc = AssociationCc::new();
        let disposition = harness
            .handle(&mut cc, &[0x85, ASSOCIATION_GROUPINGS_REPORT, 3])
            .unwrap();
        assert_eq!(disposition, Disposition::GroupCount { count: 3 });
    }
}

use crate::message::{Message, PRIORITY_COUNT, SendPriority};
use std::collections::VecDeque;
use zw_core::definitions::NodeId;

/// How many queued messages the duplicate search inspects per band
const DEDUP_SEARCH_LIMIT: usize = 32;

/// The outbound queue: one FIFO band per [SendPriority], drained highest
/// band first. Messages for sleeping nodes are pulled out wholesale and
/// parked on the node until it wakes.
#[derive(Debug, Default)]
pub struct SendQueue {
    bands: [VecDeque<Message>; PRIORITY_COUNT],
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the message's priority band. Byte-equal duplicates
    /// (ignoring callback ids) are dropped; returns false in that case.
    pub fn enqueue(&mut self, message: Message) -> bool {
        let duplicate = self
            .bands
            .iter()
            .flat_map(|band| band.iter().take(DEDUP_SEARCH_LIMIT))
            .any(|queued| queued.wire_eq(&message));
        if duplicate {
            return false;
        }
        self.bands[message.priority as usize].push_back(message);
        true
    }

    /// Re-injects a wake-up queue at the front of the WakeUp band,
    /// preserving its order. Only the band changes: bookkeeping like
    /// stage membership travels on the message itself.
    pub fn inject_wakeup(&mut self, messages: impl IntoIterator<Item = Message>) {
        let band = &mut self.bands[SendPriority::WakeUp as usize];
        for (offset, mut message) in messages.into_iter().enumerate() {
            message.priority = SendPriority::WakeUp;
            band.insert(offset, message);
        }
    }

    /// Pops the head of the highest non-empty band
    pub fn dequeue(&mut self) -> Option<Message> {
        self.bands.iter_mut().find_map(|band| band.pop_front())
    }

    /// Puts an in-flight message back at the head of its band (e.g. to
    /// resend it)
    pub fn requeue_front(&mut self, message: Message) {
        self.bands[message.priority as usize].push_front(message);
    }

    /// Removes every queued message addressed at the given node,
    /// preserving order across bands. Used when the node is declared
    /// asleep.
    pub fn extract_for_node(&mut self, node_id: NodeId) -> Vec<Message> {
        let mut extracted = Vec::new();
        for band in &mut self.bands {
            let mut keep = VecDeque::with_capacity(band.len());
            for message in band.drain(..) {
                if message.target == node_id {
                    extracted.push(message);
                } else {
                    keep.push_back(message);
                }
            }
            *band = keep;
        }
        extracted
    }

    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(VecDeque::is_empty)
    }

    pub fn len(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_serial::command::{SendDataRequest, SoftResetRequest};

    fn message(node: u8, cc: &[u8], priority: SendPriority) -> Message {
        Message::new(
            SendDataRequest::new(NodeId::new(node), cc.to_vec()).into(),
            NodeId::new(node),
            priority,
        )
    }

    #[test]
    fn test_priority_order() {
        let mut queue = SendQueue::new();
        queue.enqueue(message(5, &[0x20, 0x02], SendPriority::Poll));
        queue.enqueue(message(5, &[0x25, 0x02], SendPriority::Command));
        queue.enqueue(Message::controller(
            SoftResetRequest::default().into(),
            SendPriority::Controller,
        ));

        assert_eq!(
            queue.dequeue().unwrap().priority,
            SendPriority::Controller
        );
        assert_eq!(queue.dequeue().unwrap().priority, SendPriority::Command);
        assert_eq!(queue.dequeue().unwrap().priority, SendPriority::Poll);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_fifo_within_band() {
        let mut queue = SendQueue::new();
        queue.enqueue(message(5, &[0x20, 0x02], SendPriority::Command));
        queue.enqueue(message(7, &[0x20, 0x02], SendPriority::Command));
        assert_eq!(queue.dequeue().unwrap().target, NodeId::new(5));
        assert_eq!(queue.dequeue().unwrap().target, NodeId::new(7));
    }

    #[test]
    fn test_duplicate_dropped() {
        let mut queue = SendQueue::new();
        assert!(queue.enqueue(message(5, &[0x25, 0x02], SendPriority::Command)));
        assert!(!queue.enqueue(message(5, &[0x25, 0x02], SendPriority::Command)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_extract_for_node_preserves_others() {
        let mut queue = SendQueue::new();
        queue.enqueue(message(5, &[0x25, 0x02], SendPriority::Command));
        queue.enqueue(message(7, &[0x25, 0x02], SendPriority::Command));
        queue.enqueue(message(5, &[0x20, 0x02], SendPriority::Query));

        let extracted = queue.extract_for_node(NodeId::new(5));
        assert_eq!(extracted.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().unwrap().target, NodeId::new(7));
    }

    #[test]
    fn test_wakeup_injection_preserves_order_and_wins_over_command() {
        let mut queue = SendQueue::new();
        queue.enqueue(message(7, &[0x25, 0x02], SendPriority::Command));

        let parked = vec![
            message(5, &[0x20, 0x01, 0x63], SendPriority::Command),
            message(5, &[0x20, 0x02], SendPriority::Command),
        ];
        queue.inject_wakeup(parked);

        let first = queue.dequeue().unwrap();
        assert_eq!(first.target, NodeId::new(5));
        assert_eq!(first.priority, SendPriority::WakeUp);
        let second = queue.dequeue().unwrap();
        assert_eq!(second.target, NodeId::new(5));
        // The unrelated command comes after the wake-up drain
        assert_eq!(queue.dequeue().unwrap().target, NodeId::new(7));
    }
}

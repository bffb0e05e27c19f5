//! Remote ICE candidates that arrive before the remote description.

use std::collections::VecDeque;

use crate::error::SignalingError;

use super::types::IceCandidate;

/// FIFO of early candidates, drained exactly once.
///
/// After [`drain`](Self::drain) the queue is permanently empty and refuses
/// new entries: later candidates are applied directly by the manager.
#[derive(Debug)]
pub struct IceCandidateQueue {
    pending: VecDeque<IceCandidate>,
    capacity: usize,
    drained: bool,
}

impl IceCandidateQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity,
            drained: false,
        }
    }

    pub fn push(&mut self, candidate: IceCandidate) -> Result<(), SignalingError> {
        if self.drained {
            return Err(SignalingError::QueueDrained);
        }
        if self.pending.len() >= self.capacity {
            return Err(SignalingError::CandidateQueueFull(self.pending.len()));
        }
        self.pending.push_back(candidate);
        Ok(())
    }

    /// Take every queued candidate in receipt order. Only the first call
    /// returns anything.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.drained = true;
        self.pending.drain(..).collect()
    }

    /// Drop whatever is pending without applying it.
    pub fn dispose(&mut self) {
        self.drained = true;
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn drains_in_receipt_order() {
        let mut queue = IceCandidateQueue::new(8);
        for n in [3, 1, 2] {
            queue.push(candidate(n)).unwrap();
        }
        assert_eq!(queue.drain(), vec![candidate(3), candidate(1), candidate(2)]);
    }

    #[test]
    fn drains_exactly_once() {
        let mut queue = IceCandidateQueue::new(8);
        queue.push(candidate(1)).unwrap();
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
        assert_eq!(queue.push(candidate(2)), Err(SignalingError::QueueDrained));
    }

    #[test]
    fn rejects_beyond_capacity() {
        let mut queue = IceCandidateQueue::new(2);
        queue.push(candidate(1)).unwrap();
        queue.push(candidate(2)).unwrap();
        assert_eq!(
            queue.push(candidate(3)),
            Err(SignalingError::CandidateQueueFull(2))
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dispose_discards_pending() {
        let mut queue = IceCandidateQueue::new(4);
        queue.push(candidate(1)).unwrap();
        queue.dispose();
        assert!(queue.is_empty());
        assert!(queue.is_drained());
        assert!(queue.drain().is_empty());
    }
}

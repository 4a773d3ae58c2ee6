//! The conga ring: an ordered set of participants sharing a `conga_id`, plus
//! the `outstanding` map that lets a forwarded message recognize its own
//! originator and stop circulating.
//!
//! Grounded directly in `original_source/tornado_server/conga.py`: `join`,
//! `leave`, `new_message` and `stop_loop` below are the same algorithm, with
//! the destination-pointer relinking expressed over [`ParticipantHandle`]
//! instead of a raw object reference.

use std::collections::HashMap;

use log::debug;
use rand::Rng;
use thiserror::Error;

use conga_registry::{CongaId, MemberId};

use crate::participant::ParticipantHandle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("member {0} is already present in this conga")]
    Duplicate(MemberId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaveError {
    #[error("member {0} is not present in this conga")]
    NotFound(MemberId),
}

/// One logical ring. Every mutating method takes `&mut self`; callers hold
/// the conga behind a `tokio::sync::Mutex` for the duration of a whole
/// join/leave/new_message/stop_loop call, per the concurrency model's
/// "atomic unit" requirement.
pub struct Conga {
    conga_id: CongaId,
    participants: Vec<(MemberId, ParticipantHandle)>,
    outstanding: HashMap<String, MemberId>,
}

impl Conga {
    pub fn new(conga_id: CongaId) -> Conga {
        Conga {
            conga_id,
            participants: Vec::new(),
            outstanding: HashMap::new(),
        }
    }

    pub fn conga_id(&self) -> CongaId {
        self.conga_id
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, member_id: MemberId) -> bool {
        self.participants.iter().any(|(id, _)| *id == member_id)
    }

    /// Inserts `handle` at its sorted position and relinks its new neighbors.
    /// A lone joiner is linked to itself.
    pub async fn join(&mut self, handle: ParticipantHandle) -> Result<(), JoinError> {
        let id = handle.member_id();

        if self.participants.is_empty() {
            handle.set_destination(Some(handle.clone())).await;
            self.participants.push((id, handle));
            debug!("conga {}: member {} joined alone", self.conga_id, id);
            return Ok(());
        }

        let tail_id = self.participants.last().unwrap().0;

        let (prev, next, insert_at) = if tail_id < id {
            let prev = self.participants.last().unwrap().1.clone();
            let next = self.participants.first().unwrap().1.clone();
            (prev, next, self.participants.len())
        } else {
            let index = match self.participants.iter().position(|(pid, _)| *pid > id) {
                Some(index) => index,
                // No element is strictly greater than `id`, yet `id <= tail_id`:
                // `id` must equal the tail, i.e. a duplicate of the last member.
                None => return Err(JoinError::Duplicate(id)),
            };

            if self.participants[index].0 == id {
                return Err(JoinError::Duplicate(id));
            }

            let prev_index = if index == 0 { self.participants.len() - 1 } else { index - 1 };
            if self.participants[prev_index].0 == id {
                return Err(JoinError::Duplicate(id));
            }

            (
                self.participants[prev_index].1.clone(),
                self.participants[index].1.clone(),
                index,
            )
        };

        self.participants.insert(insert_at, (id, handle.clone()));
        prev.set_destination(Some(handle.clone())).await;
        handle.set_destination(Some(next)).await;
        debug!("conga {}: member {} joined, ring size {}", self.conga_id, id, self.participants.len());
        Ok(())
    }

    /// Removes `member_id` and relinks its former neighbors around the gap.
    pub async fn leave(&mut self, member_id: MemberId) -> Result<(), LeaveError> {
        if self.participants.len() == 1 {
            self.participants.pop();
            debug!("conga {}: last member {} left, ring now empty", self.conga_id, member_id);
            return Ok(());
        }

        let index = self
            .participants
            .iter()
            .position(|(id, _)| *id == member_id)
            .ok_or(LeaveError::NotFound(member_id))?;

        let n = self.participants.len();
        let prev_index = (index + n - 1) % n;
        let next_index = (index + 1) % n;

        let prev = self.participants[prev_index].1.clone();
        let next = self.participants[next_index].1.clone();
        prev.set_destination(Some(next)).await;

        self.participants.remove(index);
        debug!("conga {}: member {} left, ring size {}", self.conga_id, member_id, self.participants.len());
        Ok(())
    }

    /// Allocates a fresh message id, uniformly over `[1, 2^32]`, retrying on
    /// collision within `outstanding`. Formatted the way the original does:
    /// right-aligned in a 10-character field, then trimmed — so the result
    /// is usually, but not always, 10 characters long.
    pub fn new_message(&mut self, originator_id: MemberId) -> String {
        loop {
            let candidate: u64 = rand::thread_rng().gen_range(1..=4_294_967_296u64);
            let id = format!("{:>10}", candidate).trim().to_string();
            if !self.outstanding.contains_key(&id) {
                self.outstanding.insert(id.clone(), originator_id);
                return id;
            }
        }
    }

    /// Decides whether a message has completed its lap. Returns `true` if
    /// the caller should drop the frame instead of forwarding it.
    pub fn stop_loop(&mut self, message_id: &str, next_hop_id: MemberId) -> bool {
        let message_id = message_id.trim();

        let originator = match self.outstanding.get(message_id) {
            Some(originator) => *originator,
            None => return true,
        };

        if originator == next_hop_id {
            self.outstanding.remove(message_id);
            return true;
        }

        if !self.contains(originator) {
            self.outstanding.remove(message_id);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ParticipantHandle;

    async fn destinations(conga: &Conga) -> Vec<Option<MemberId>> {
        let mut out = Vec::new();
        for (_, handle) in &conga.participants {
            out.push(handle.destination_member_id().await);
        }
        out
    }

    #[tokio::test]
    async fn single_join_points_to_self() {
        let mut conga = Conga::new(1);
        let h1 = ParticipantHandle::detached(10);
        conga.join(h1.clone()).await.unwrap();
        assert_eq!(h1.destination_member_id().await, Some(10));
    }

    #[tokio::test]
    async fn members_join_in_ascending_order_and_ring_closes() {
        let mut conga = Conga::new(1);
        for id in [10, 30, 20] {
            conga.join(ParticipantHandle::detached(id)).await.unwrap();
        }
        let ids: Vec<MemberId> = conga.participants.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(destinations(&conga).await, vec![Some(20), Some(30), Some(10)]);
    }

    #[tokio::test]
    async fn joining_past_the_tail_appends() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(5)).await.unwrap();
        conga.join(ParticipantHandle::detached(50)).await.unwrap();
        let ids: Vec<MemberId> = conga.participants.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![5, 50]);
        assert_eq!(destinations(&conga).await, vec![Some(50), Some(5)]);
    }

    #[tokio::test]
    async fn duplicate_member_id_is_rejected() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(10)).await.unwrap();
        let err = conga.join(ParticipantHandle::detached(10)).await.unwrap_err();
        assert_eq!(err, JoinError::Duplicate(10));
    }

    #[tokio::test]
    async fn leaving_sole_member_empties_the_ring() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(10)).await.unwrap();
        conga.leave(10).await.unwrap();
        assert!(conga.is_empty());
    }

    #[tokio::test]
    async fn leaving_a_middle_member_relinks_its_neighbors() {
        let mut conga = Conga::new(1);
        for id in [10, 20, 30] {
            conga.join(ParticipantHandle::detached(id)).await.unwrap();
        }
        conga.leave(20).await.unwrap();
        let ids: Vec<MemberId> = conga.participants.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 30]);
        assert_eq!(destinations(&conga).await, vec![Some(30), Some(10)]);
    }

    #[tokio::test]
    async fn leaving_unknown_member_fails() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(10)).await.unwrap();
        let err = conga.leave(99).await.unwrap_err();
        assert_eq!(err, LeaveError::NotFound(99));
    }

    #[tokio::test]
    async fn new_message_ids_are_unique_and_tracked() {
        let mut conga = Conga::new(1);
        let a = conga.new_message(10);
        let b = conga.new_message(10);
        assert_ne!(a, b);
        assert!(conga.outstanding.contains_key(&a));
        assert!(conga.outstanding.contains_key(&b));
    }

    #[tokio::test]
    async fn stop_loop_terminates_when_message_returns_to_originator() {
        let mut conga = Conga::new(1);
        let id = conga.new_message(10);
        assert!(!conga.stop_loop(&id, 20));
        assert!(conga.stop_loop(&id, 10));
        assert!(!conga.outstanding.contains_key(&id));
    }

    #[tokio::test]
    async fn stop_loop_drops_unknown_message_ids() {
        let mut conga = Conga::new(1);
        assert!(conga.stop_loop("0000000001", 10));
    }

    #[tokio::test]
    async fn stop_loop_drops_messages_whose_originator_already_left() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(10)).await.unwrap();
        conga.join(ParticipantHandle::detached(20)).await.unwrap();
        let id = conga.new_message(10);
        conga.leave(10).await.unwrap();
        assert!(conga.stop_loop(&id, 20));
        assert!(!conga.outstanding.contains_key(&id));
    }

    #[tokio::test]
    async fn single_member_echo_is_suppressed() {
        let mut conga = Conga::new(1);
        conga.join(ParticipantHandle::detached(10)).await.unwrap();
        let id = conga.new_message(10);
        // The sole member is its own next hop; the message stops immediately.
        assert!(conga.stop_loop(&id, 10));
    }
}

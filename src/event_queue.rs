// Copyright (C) 2017 Jesse Jones
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 3, or (at your option)
// any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA.
use crate::agent_id::*;
use crate::event::*;
use crate::sim_time::*;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// What happened to an event pushed onto an `EventQueue`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pushed
{
	/// The event is pending.
	Queued,

	/// The event met its counterpart (positive event or anti-message) and
	/// both were dropped.
	Annihilated,
}

// The fields Event::cancels compares plus whether the event is an anti-message.
type Identity = (AgentID, u64, AgentID, Time, Time, bool);

fn identity(event: &Event) -> Identity
{
	(event.sender(), event.seq(), event.receiver(), event.sent_time(), event.receive_time(), event.is_anti_message())
}

fn counterpart(event: &Event) -> Identity
{
	let mut id = identity(event);
	id.5 = !id.5;
	id
}

/// An agent's pending events ordered by receive time. Events with the same
/// receive time are kept in arrival order. Anti-messages annihilate their
/// positive counterpart on contact, an anti-message that can't find its
/// positive stays in the queue (so that the agent notices it has to roll
/// back) until it is popped, after which it is parked until the positive
/// shows up.
pub struct EventQueue
{
	events: BTreeMap<(Time, u64), EventRef>,
	index: BTreeSet<(Identity, u64)>,		// arrival numbers of the events by identity
	orphans: BTreeMap<(Identity, u64), EventRef>,
	arrivals: u64,
}

impl EventQueue
{
	pub fn new() -> EventQueue
	{
		EventQueue{events: BTreeMap::new(), index: BTreeSet::new(), orphans: BTreeMap::new(), arrivals: 0}
	}

	pub fn push(&mut self, event: EventRef) -> Pushed
	{
		let other = counterpart(&event);
		if let Some(arrival) = self.find(other) {
			self.index.remove(&(other, arrival));
			self.events.remove(&(event.receive_time(), arrival));
			return Pushed::Annihilated;
		}

		if let Some(key) = self.orphans.range((other, 0)..=(other, u64::MAX)).next().map(|(key, _)| *key) {
			self.orphans.remove(&key);
			return Pushed::Annihilated;
		}

		let arrival = self.arrivals;
		self.arrivals += 1;
		self.index.insert((identity(&event), arrival));
		self.events.insert((event.receive_time(), arrival), event);
		Pushed::Queued
	}

	/// The receive time of the earliest pending event or INFINITY.
	pub fn top_time(&self) -> Time
	{
		match self.events.keys().next() {
			Some(key) => key.0,
			None => Time::INFINITY,
		}
	}

	pub fn top(&self) -> Option<&EventRef>
	{
		self.events.values().next()
	}

	/// The pending events at time in arrival order, anti-messages included.
	pub fn pending_at(&self, time: Time) -> impl Iterator<Item = &EventRef>
	{
		self.events.range((time, 0)..=(time, u64::MAX)).map(|(_, e)| e)
	}

	/// Removes every event sharing the earliest receive time. Anti-messages
	/// at that time are parked instead of returned.
	pub fn pop_batch(&mut self) -> Vec<EventRef>
	{
		let time = self.top_time();
		let mut batch = Vec::new();
		while let Some(entry) = self.events.first_entry() {
			if entry.key().0 != time {
				break;
			}
			let arrival = entry.key().1;
			let event = entry.remove();
			let id = identity(&event);
			self.index.remove(&(id, arrival));
			if event.is_anti_message() {
				self.orphans.insert((id, arrival), event);
			} else {
				batch.push(event);
			}
		}
		batch
	}

	/// Removes a pending event, used when an agent cancels an event it sent
	/// to itself. Returns false if the event isn't pending.
	pub fn cancel(&mut self, event: &EventRef) -> bool
	{
		let id = identity(event);
		let time = event.receive_time();
		let found = self.index.range((id, 0)..=(id, u64::MAX))
			.map(|&(_, arrival)| arrival)
			.find(|&arrival| self.events.get(&(time, arrival)).map_or(false, |e| e.ptr_eq(event)));
		if let Some(arrival) = found {
			self.index.remove(&(id, arrival));
			self.events.remove(&(time, arrival));
			true
		} else {
			false
		}
	}

	pub fn len(&self) -> usize
	{
		self.events.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.events.is_empty()
	}

	pub fn num_orphans(&self) -> usize
	{
		self.orphans.len()
	}

	/// Releases everything, used at teardown.
	pub fn clear(&mut self)
	{
		self.events.clear();
		self.index.clear();
		self.orphans.clear();
	}

	fn find(&self, id: Identity) -> Option<u64>
	{
		self.index.range((id, 0)..=(id, u64::MAX)).next().map(|&(_, arrival)| arrival)
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn event(sender: u32, seq: u64, time: i64) -> EventRef
	{
		let mut event = Event::new(AgentID(0), Time(time));
		event.stamp(AgentID(sender), Time(0), seq);
		EventRef::new(event)
	}

	#[test]
	fn batches_share_a_time()
	{
		let mut queue = EventQueue::new();
		queue.push(event(1, 0, 5));
		queue.push(event(2, 0, 3));
		queue.push(event(3, 0, 5));
		queue.push(event(4, 0, 3));
		assert_eq!(queue.top_time(), Time(3));

		let batch = queue.pop_batch();
		let senders: Vec<_> = batch.iter().map(|e| e.sender()).collect();
		assert_eq!(senders, vec![AgentID(2), AgentID(4)]);	// FIFO within a time
		assert_eq!(queue.pending_at(Time(5)).count(), 2);

		let batch = queue.pop_batch();
		let senders: Vec<_> = batch.iter().map(|e| e.sender()).collect();
		assert_eq!(senders, vec![AgentID(1), AgentID(3)]);
		assert!(queue.is_empty());
		assert_eq!(queue.top_time(), Time::INFINITY);
		assert!(queue.pop_batch().is_empty());
	}

	#[test]
	fn anti_message_annihilates_pending_event()
	{
		let mut queue = EventQueue::new();
		let positive = event(1, 7, 5);
		queue.push(positive.increase_reference());
		queue.push(event(1, 8, 6));

		let anti = EventRef::new(positive.anti_message());
		assert_eq!(queue.push(anti), Pushed::Annihilated);
		assert_eq!(queue.len(), 1);
		assert_eq!(queue.top_time(), Time(6));
		assert_eq!(positive.reference_count(), 1);
	}

	#[test]
	fn early_anti_message_is_parked()
	{
		let mut queue = EventQueue::new();
		let positive = event(1, 7, 5);
		let anti = EventRef::new(positive.anti_message());

		assert_eq!(queue.push(anti), Pushed::Queued);
		assert_eq!(queue.top_time(), Time(5));
		assert!(queue.pop_batch().is_empty());
		assert_eq!(queue.num_orphans(), 1);

		assert_eq!(queue.push(positive), Pushed::Annihilated);
		assert_eq!(queue.num_orphans(), 0);
		assert!(queue.is_empty());
	}

	#[test]
	fn cancel_removes_the_same_event()
	{
		let mut queue = EventQueue::new();
		let first = event(1, 1, 5);
		queue.push(first.increase_reference());
		queue.push(event(1, 2, 5));

		assert!(queue.cancel(&first));
		assert!(!queue.cancel(&first));
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn large_queues_annihilate_by_identity()
	{
		const COUNT: u64 = 100_000;

		let mut queue = EventQueue::new();
		let events: Vec<_> = (0..COUNT).map(|seq| event(1, seq, (seq % 97) as i64)).collect();
		for e in events.iter() {
			assert_eq!(queue.push(e.increase_reference()), Pushed::Queued);
		}
		assert_eq!(queue.len(), COUNT as usize);

		for e in events.iter().rev().step_by(2) {
			assert_eq!(queue.push(EventRef::new(e.anti_message())), Pushed::Annihilated);
		}
		assert!(queue.cancel(&events[0]));
		assert_eq!(queue.len(), (COUNT / 2 - 1) as usize);
		assert!(events.iter().skip(1).step_by(2).all(|e| e.reference_count() == 1));
		assert!(events.iter().skip(2).step_by(2).all(|e| e.reference_count() == 2));
	}

	#[test]
	fn identical_events_are_cancelled_one_at_a_time()
	{
		let mut queue = EventQueue::new();
		let first = event(1, 3, 5);
		let second = event(1, 3, 5);
		queue.push(first.increase_reference());
		queue.push(second.increase_reference());

		assert!(queue.cancel(&second));
		assert_eq!(queue.len(), 1);
		assert!(queue.top().map_or(false, |e| e.ptr_eq(&first)));
		assert_eq!(queue.push(EventRef::new(first.anti_message())), Pushed::Annihilated);
		assert!(queue.is_empty());
	}
}

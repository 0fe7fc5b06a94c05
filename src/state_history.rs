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
use crate::sim_time::*;
use std::collections::VecDeque;

/// An agent's state as of some time along with enough bookkeeping to
/// undo everything the agent did after the snapshot was taken.
#[derive(Clone, Debug)]
pub struct Snapshot<S>
{
	pub time: Time,

	/// False only for the snapshot taken after initialization. A snapshot
	/// taken after a batch at time t no longer holds for a straggler at t.
	pub after_batch: bool,

	pub state: S,

	/// Length of the agent's processed event history when the snapshot was taken.
	pub inputs: usize,

	/// Length of the agent's sent event history when the snapshot was taken.
	pub outputs: usize,
}

impl<S> Snapshot<S>
{
	/// True if a straggler at time can be repaired by restoring this snapshot.
	pub fn precedes(&self, time: Time) -> bool
	{
		self.time < time || (self.time == time && !self.after_batch)
	}
}

/// Snapshots ordered by time, oldest first.
pub struct StateHistory<S>
{
	snapshots: VecDeque<Snapshot<S>>,
}

impl<S: Clone> StateHistory<S>
{
	pub fn new() -> StateHistory<S>
	{
		StateHistory{snapshots: VecDeque::new()}
	}

	pub fn archive(&mut self, snapshot: Snapshot<S>)
	{
		if let Some(last) = self.snapshots.back() {
			assert!(snapshot.time >= last.time, "snapshot at {} is older than the last snapshot at {}", snapshot.time, last.time);
			assert!(snapshot.inputs >= last.inputs && snapshot.outputs >= last.outputs, "snapshot history marks went backwards");
		}
		self.snapshots.push_back(snapshot);
	}

	pub fn latest(&self) -> Option<&Snapshot<S>>
	{
		self.snapshots.back()
	}

	/// Returns the newest snapshot taken at or before time.
	pub fn at_or_before(&self, time: Time) -> Option<&Snapshot<S>>
	{
		self.snapshots.iter().rev().find(|s| s.time <= time)
	}

	/// Discards snapshots taken after time.
	pub fn truncate_after(&mut self, time: Time)
	{
		while self.snapshots.back().map_or(false, |s| s.time > time) {
			self.snapshots.pop_back();
		}
	}

	/// Discards the snapshots a straggler at time invalidates and returns the
	/// snapshot to restore.
	pub fn rollback_to(&mut self, time: Time) -> &Snapshot<S>
	{
		while self.snapshots.back().map_or(false, |s| !s.precedes(time)) {
			self.snapshots.pop_back();
		}
		match self.snapshots.back() {
			Some(snapshot) => snapshot,
			None => panic!("can't roll back to {}: no snapshot is old enough (rollback below GVT?)", time),
		}
	}

	/// Drops the snapshots no straggler at or after gvt can reach. Returns the
	/// history marks of the oldest kept snapshot: processed and sent events
	/// before those marks can be dropped too. The remaining snapshots are
	/// rebased so that their marks stay valid once the caller does so.
	pub fn collect_garbage(&mut self, gvt: Time) -> (usize, usize)
	{
		let keep = match self.snapshots.iter().rposition(|s| s.precedes(gvt)) {
			Some(index) => index,
			None => return (0, 0),
		};
		self.snapshots.drain(..keep);

		let (inputs, outputs) = match self.snapshots.front() {
			Some(oldest) => (oldest.inputs, oldest.outputs),
			None => (0, 0),
		};
		for snapshot in self.snapshots.iter_mut() {
			snapshot.inputs -= inputs;
			snapshot.outputs -= outputs;
		}
		(inputs, outputs)
	}

	pub fn len(&self) -> usize
	{
		self.snapshots.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.snapshots.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Snapshot<S>>
	{
		self.snapshots.iter()
	}

	pub fn clear(&mut self)
	{
		self.snapshots.clear();
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn snapshot(time: i64, after_batch: bool, state: &str, marks: usize) -> Snapshot<String>
	{
		Snapshot{time: Time(time), after_batch, state: state.to_string(), inputs: marks, outputs: marks}
	}

	fn history() -> StateHistory<String>
	{
		let mut history = StateHistory::new();
		history.archive(snapshot(0, false, "init", 0));
		history.archive(snapshot(2, true, "two", 1));
		history.archive(snapshot(5, true, "five", 2));
		history.archive(snapshot(10, true, "ten", 3));
		history
	}

	#[test]
	fn lookup()
	{
		let history = history();
		assert_eq!(history.at_or_before(Time(7)).map(|s| s.state.as_str()), Some("five"));
		assert_eq!(history.at_or_before(Time(5)).map(|s| s.state.as_str()), Some("five"));
		assert_eq!(history.at_or_before(Time(100)).map(|s| s.state.as_str()), Some("ten"));
		assert!(history.at_or_before(Time(-1)).is_none());
	}

	#[test]
	fn truncate()
	{
		let mut history = history();
		history.truncate_after(Time(5));
		assert_eq!(history.len(), 3);
		assert_eq!(history.latest().map(|s| s.time), Some(Time(5)));
	}

	#[test]
	fn rollback_restores_the_latest_older_snapshot()
	{
		let mut history = history();
		assert_eq!(history.rollback_to(Time(7)).state, "five");
		assert_eq!(history.len(), 3);

		// a straggler at 5 invalidates the batch that ran at 5
		assert_eq!(history.rollback_to(Time(5)).state, "two");
		assert_eq!(history.rollback_to(Time(0)).state, "init");
		assert_eq!(history.len(), 1);
	}

	#[test]
	#[should_panic(expected = "no snapshot is old enough")]
	fn rollback_too_far()
	{
		let mut history = history();
		history.rollback_to(Time(-3));
	}

	#[test]
	fn garbage_collection_keeps_a_restorable_snapshot()
	{
		let mut history = history();
		assert_eq!(history.collect_garbage(Time(6)), (2, 2));
		assert_eq!(history.len(), 2);

		let times: Vec<_> = history.iter().map(|s| (s.time, s.inputs)).collect();
		assert_eq!(times, vec![(Time(5), 0), (Time(10), 1)]);

		// nothing older than gvt can be restored so collecting again is a no-op
		assert_eq!(history.collect_garbage(Time(6)), (0, 0));
		assert_eq!(history.rollback_to(Time(6)).state, "five");
	}

	#[test]
	fn garbage_collection_at_a_batch_time()
	{
		let mut history = history();
		assert_eq!(history.collect_garbage(Time(5)), (1, 1));	// a straggler at 5 needs "two"
		assert_eq!(history.iter().next().map(|s| s.state.as_str()), Some("two"));
	}
}

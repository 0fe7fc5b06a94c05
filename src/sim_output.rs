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
use crate::context::*;
use crate::logging::*;
use crate::sim_time::*;
use std::collections::VecDeque;

/// What an agent logged while executing optimistically. Lines are held
/// until GVT passes the time they were logged at: after that the batch
/// that produced them can no longer be rolled back.
pub struct SimOutput
{
	records: VecDeque<(Time, LogRecord)>,
}

impl SimOutput
{
	pub fn new() -> SimOutput
	{
		SimOutput{records: VecDeque::new()}
	}

	pub fn record(&mut self, time: Time, record: LogRecord)
	{
		self.records.push_back((time, record));
	}

	/// Discards everything logged at or after time, i.e. by the batches a
	/// straggler at time undid. Returns the number of lines discarded.
	pub fn rollback(&mut self, time: Time) -> usize
	{
		let old_len = self.records.len();
		self.records.retain(|&(t, _)| t < time);
		old_len - self.records.len()
	}

	/// Logs and releases the lines from before gvt. Returns the number of
	/// lines committed.
	pub fn commit(&mut self, gvt: Time, topic: &str, logger: &Logger) -> usize
	{
		let mut count = 0;
		while self.records.front().map_or(false, |&(time, _)| time < gvt) {
			if let Some((time, record)) = self.records.pop_front() {
				logger.log(time, record.level, topic, &record.message);
				count += 1;
			}
		}
		count
	}

	/// Used when the simulation is over.
	pub fn commit_all(&mut self, topic: &str, logger: &Logger) -> usize
	{
		let count = self.records.len();
		for (time, record) in self.records.drain(..) {
			logger.log(time, record.level, topic, &record.message);
		}
		count
	}

	pub fn len(&self) -> usize
	{
		self.records.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.records.is_empty()
	}

	/// The buffered lines, oldest first.
	pub fn iter(&self) -> impl Iterator<Item = (Time, &str)>
	{
		self.records.iter().map(|&(time, ref record)| (time, record.message.as_str()))
	}
}

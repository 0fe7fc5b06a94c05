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
use crate::logging::*;
use crate::sim_time::*;
use std::any::Any;

/// A message an agent logged while executing events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogRecord
{
	pub level: LogLevel,
	pub message: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Hook
{
	Initialize,
	Execute,
	Finalize,
}

/// Handed to the `Agent` hooks. Events scheduled here are sent once the
/// hook returns. Messages logged from execute_task are held until GVT
/// passes ctx.time() so that batches which are rolled back print nothing.
pub struct Context<'a>
{
	id: AgentID,
	name: &'a str,
	time: Time,
	logger: &'a Logger,
	events: Vec<Event>,
	logs: Vec<LogRecord>,
	hook: Hook,
}

impl<'a> Context<'a>
{
	/// Used for initialize: output is logged right away.
	pub(crate) fn new(id: AgentID, name: &'a str, time: Time, logger: &'a Logger) -> Context<'a>
	{
		Context{id, name, time, logger, events: Vec::new(), logs: Vec::new(), hook: Hook::Initialize}
	}

	/// Used for execute_task: output is buffered.
	pub(crate) fn speculative(id: AgentID, name: &'a str, time: Time, logger: &'a Logger) -> Context<'a>
	{
		Context{id, name, time, logger, events: Vec::new(), logs: Vec::new(), hook: Hook::Execute}
	}

	/// Used for finalize: events scheduled there are ignored.
	pub(crate) fn closed(id: AgentID, name: &'a str, time: Time, logger: &'a Logger) -> Context<'a>
	{
		Context{id, name, time, logger, events: Vec::new(), logs: Vec::new(), hook: Hook::Finalize}
	}

	/// The agent being executed.
	pub fn id(&self) -> AgentID
	{
		self.id
	}

	pub fn name(&self) -> &str
	{
		self.name
	}

	/// The agent's LVT.
	pub fn time(&self) -> Time
	{
		self.time
	}

	/// Sends an event. Events may be scheduled for the current time, which
	/// for events an agent sends itself means that they are processed in a
	/// new batch before time advances.
	pub fn schedule_event(&mut self, event: Event)
	{
		assert!(event.receive_time() >= self.time, "{} scheduled an event for {} which is before its time {}", self.name, event.receive_time(), self.time);
		assert!(!event.is_anti_message(), "{} attempted to schedule an anti-message", self.name);

		if self.hook == Hook::Finalize {
			log_warning!(self, "ignoring event for {} scheduled while finalizing", event.receiver());
		} else {
			self.events.push(event);
		}
	}

	/// Schedules an event with a payload delay ticks from now.
	pub fn schedule_after<T: Any + Send + Sync>(&mut self, to: AgentID, delay: i64, payload: T)
	{
		let event = Event::with_payload(to, self.time.after(delay), payload);
		self.schedule_event(event);
	}

	/// Normally you'll use one of the log macros, e.g. log_info!.
	pub fn log(&mut self, level: LogLevel, message: &str)
	{
		if self.hook != Hook::Execute {
			self.logger.log(self.time, level, self.name, message);
		} else if self.logger.should_log(level, self.name) {
			self.logs.push(LogRecord{level, message: message.to_string()});
		}
	}

	/// Messages logged from execute_task, oldest first.
	pub fn pending_logs(&self) -> &[LogRecord]
	{
		&self.logs
	}

	pub(crate) fn into_parts(self) -> (Vec<Event>, Vec<LogRecord>)
	{
		(self.events, self.logs)
	}
}

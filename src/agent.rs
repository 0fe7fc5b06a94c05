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
use crate::context::*;
use crate::error::*;
use crate::event::*;
use crate::event_queue::*;
use crate::logging::*;
use crate::sim_output::*;
use crate::sim_time::*;
use crate::spin_lock::*;
use crate::state_history::*;
use crate::stats::*;
use std::error::Error;

pub type InitResult = Result<(), Box<dyn Error + Send + Sync>>;

/// `Agent`s are the logical processes of a `Simulation`. They respond to
/// `Event`s which execute at some particular `Time` and communicate with
/// other agents by scheduling events of their own.
///
/// Agents run optimistically: an agent may execute events before an agent
/// that is behind it sends it an earlier event. When that happens the kernel
/// rolls the agent back by restoring an older copy of its `State` and then
/// re-executes. For that to work everything execute_task mutates has to
/// live in the State (which is why execute_task takes &self). Random
/// number generators included, see `new_rng`.
pub trait Agent: Send
{
	/// Cloned after every batch so cloning should be cheap.
	type State: Clone + Send;

	/// Called once before any events are processed. Events scheduled here
	/// are sent at the start time. An error takes the agent out of the
	/// simulation (events sent to it are rejected).
	fn initialize(&mut self, _state: &mut Self::State, _ctx: &mut Context) -> InitResult
	{
		Ok(())
	}

	/// Called with every event the agent received for ctx.time(). Note that
	/// this may be called more than once for a time if the agent is rolled
	/// back. Messages logged through ctx are printed once GVT passes
	/// ctx.time().
	fn execute_task(&self, state: &mut Self::State, events: &[EventRef], ctx: &mut Context);

	/// Called once after the simulation finishes. Events can no longer be
	/// scheduled.
	fn finalize(&mut self, _state: &Self::State, _ctx: &mut Context)
	{
	}
}

/// What a processing step did.
pub struct Outcome
{
	/// True if execute_task was called.
	pub executed: bool,

	pub rolled_back: bool,

	/// Events and anti-messages to deliver, anti-messages first.
	pub events: Vec<EventRef>,
}

impl Outcome
{
	pub fn new() -> Outcome
	{
		Outcome{executed: false, rolled_back: false, events: Vec::new()}
	}
}

/// The kernel's view of an agent. Implemented by `AgentCore` which erases
/// the agent's `State` type so that the scheduler can manage every agent
/// the same way.
pub trait Schedulable: Send
{
	fn id(&self) -> AgentID;

	fn name(&self) -> &str;

	fn lvt(&self) -> Time;

	/// Returns the events the agent scheduled.
	fn initialize(&mut self, start_time: Time, logger: &Logger) -> Result<Vec<EventRef>, KernelError>;

	/// Rolls back if the queue holds a straggler and then executes the
	/// batch of events at the queue's earliest time.
	fn process_next_events(&mut self, queue: &SpinLock<EventQueue>, logger: &Logger) -> Outcome;

	/// Drops whatever can no longer be rolled back to.
	fn collect_garbage(&mut self, gvt: Time);

	/// Logs the output of batches executed before gvt.
	fn commit_output(&mut self, gvt: Time, logger: &Logger);

	fn finalize(&mut self, logger: &Logger);

	fn stats(&self) -> AgentStats;

	/// Number of snapshots, processed events, and sent events retained.
	fn retained(&self) -> (usize, usize, usize);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase
{
	Created,
	Running,
	Failed,
	Finalized,
}

/// Wraps an `Agent` with its live state, LVT, and the histories needed to
/// roll it back.
pub struct AgentCore<A: Agent>
{
	id: AgentID,
	name: String,
	agent: A,
	state: A::State,
	lvt: Time,
	executed: bool,	// true if lvt was set by executing a batch (as opposed to initialize)
	history: StateHistory<A::State>,
	inputs: Vec<EventRef>,	// processed events, oldest first
	outputs: Vec<EventRef>,	// sent events, oldest first
	output: SimOutput,
	next_seq: u64,
	stats: AgentStats,
	phase: Phase,
}

impl<A: Agent> AgentCore<A>
{
	pub fn new(id: AgentID, name: &str, agent: A, state: A::State) -> AgentCore<A>
	{
		assert!(id != NO_AGENT, "NO_AGENT can't be used as an agent id");
		assert!(!name.is_empty(), "name should not be empty");

		AgentCore {
			id,
			name: name.to_string(),
			agent,
			state,
			lvt: Time::NEG_INFINITY,
			executed: false,
			history: StateHistory::new(),
			inputs: Vec::new(),
			outputs: Vec::new(),
			output: SimOutput::new(),
			next_seq: 0,
			stats: AgentStats::default(),
			phase: Phase::Created,
		}
	}

	pub fn state(&self) -> &A::State
	{
		&self.state
	}

	pub fn history(&self) -> &StateHistory<A::State>
	{
		&self.history
	}

	/// Messages logged by batches that may still be rolled back.
	pub fn output(&self) -> &SimOutput
	{
		&self.output
	}

	fn send(&mut self, events: Vec<Event>) -> Vec<EventRef>
	{
		let mut sent = Vec::with_capacity(events.len());
		for mut event in events {
			event.stamp(self.id, self.lvt, self.next_seq);
			self.next_seq += 1;

			let event = EventRef::new(event);
			self.outputs.push(event.increase_reference());
			sent.push(event);
		}
		sent
	}

	// An event at the current LVT is only safe if it's one we sent ourself
	// while executing at that time.
	fn is_straggler(&self, time: Time, pending: &EventQueue) -> bool
	{
		if time < self.lvt {
			true
		} else if time == self.lvt && self.executed {
			let id = self.id;
			pending.pending_at(time).any(|e| e.is_anti_message() || e.sender() != id || e.sent_time() != time)
		} else {
			false
		}
	}

	fn rollback(&mut self, time: Time, queue: &SpinLock<EventQueue>, logger: &Logger, outcome: &mut Outcome)
	{
		let old_lvt = self.lvt;
		let old_len = self.history.len();
		let (inputs, outputs) = {
			let snapshot = self.history.rollback_to(time);
			self.state = snapshot.state.clone();
			self.lvt = snapshot.time;
			self.executed = snapshot.after_batch;
			(snapshot.inputs, snapshot.outputs)
		};
		let undone = (old_len - self.history.len()) as u64;
		let discarded = self.output.rollback(time);

		let inputs = self.inputs.split_off(inputs);
		let outputs = self.outputs.split_off(outputs);
		{
			let mut pending = queue.lock();
			for event in inputs {
				pending.push(event);
			}
			for event in outputs.iter().filter(|e| e.receiver() == self.id) {
				pending.cancel(event);
			}
		}

		let mut antis = 0;
		for event in outputs {
			if event.receiver() != self.id {
				outcome.events.push(EventRef::new(event.anti_message()));
				antis += 1;
			}
		}

		self.stats.rollbacks += 1;
		self.stats.undone_batches += undone;
		self.stats.anti_messages += antis;
		outcome.rolled_back = true;

		logger.log(self.lvt, LogLevel::Debug, &self.name,
			&format!("straggler at {} rolled back from {} ({} batches undone, {} anti-messages, {} lines discarded)", time, old_lvt, undone, antis, discarded));
	}

	fn execute(&mut self, time: Time, batch: Vec<EventRef>, logger: &Logger, outcome: &mut Outcome)
	{
		self.lvt = time;
		self.executed = true;

		let (outgoing, logs) = {
			let mut ctx = Context::speculative(self.id, &self.name, time, logger);
			self.agent.execute_task(&mut self.state, &batch, &mut ctx);
			ctx.into_parts()
		};
		for record in logs {
			self.output.record(time, record);
		}
		self.stats.batches += 1;
		self.stats.events += batch.len() as u64;
		self.inputs.extend(batch);

		let sent = self.send(outgoing);
		outcome.events.extend(sent);
		outcome.executed = true;

		self.history.archive(Snapshot{time, after_batch: true, state: self.state.clone(), inputs: self.inputs.len(), outputs: self.outputs.len()});
	}
}

impl<A: Agent> Schedulable for AgentCore<A>
{
	fn id(&self) -> AgentID
	{
		self.id
	}

	fn name(&self) -> &str
	{
		&self.name
	}

	fn lvt(&self) -> Time
	{
		self.lvt
	}

	fn initialize(&mut self, start_time: Time, logger: &Logger) -> Result<Vec<EventRef>, KernelError>
	{
		assert!(self.phase == Phase::Created, "{} was already initialized", self.name);

		self.lvt = start_time;
		let outgoing = {
			let mut ctx = Context::new(self.id, &self.name, start_time, logger);
			match self.agent.initialize(&mut self.state, &mut ctx) {
				Ok(()) => ctx.into_parts().0,
				Err(err) => {
					self.phase = Phase::Failed;
					return Err(KernelError::Initialization{agent: self.name.clone(), reason: err.to_string()});
				}
			}
		};

		let sent = self.send(outgoing);
		self.history.archive(Snapshot{time: start_time, after_batch: false, state: self.state.clone(), inputs: 0, outputs: self.outputs.len()});
		self.phase = Phase::Running;
		Ok(sent)
	}

	fn process_next_events(&mut self, queue: &SpinLock<EventQueue>, logger: &Logger) -> Outcome
	{
		let mut outcome = Outcome::new();
		if self.phase != Phase::Running {
			return outcome;
		}

		loop {
			let (time, batch) = {
				let mut pending = queue.lock();
				let time = pending.top_time();
				if time == Time::INFINITY {
					return outcome;
				}
				if self.is_straggler(time, &pending) {
					(time, None)
				} else {
					(time, Some(pending.pop_batch()))
				}
			};

			match batch {
				None => self.rollback(time, queue, logger, &mut outcome),
				Some(ref events) if events.is_empty() => (),	// only anti-messages waiting for their event
				Some(events) => {
					self.execute(time, events, logger, &mut outcome);
					return outcome;
				}
			}
		}
	}

	fn collect_garbage(&mut self, gvt: Time)
	{
		if self.phase == Phase::Running {
			let (inputs, outputs) = self.history.collect_garbage(gvt);
			self.inputs.drain(..inputs);
			self.outputs.drain(..outputs);
		}
	}

	fn commit_output(&mut self, gvt: Time, logger: &Logger)
	{
		self.output.commit(gvt, &self.name, logger);
	}

	fn finalize(&mut self, logger: &Logger)
	{
		assert!(self.phase != Phase::Finalized, "{} was already finalized", self.name);

		if self.phase == Phase::Running {
			self.output.commit_all(&self.name, logger);
			let mut ctx = Context::closed(self.id, &self.name, self.lvt, logger);
			self.agent.finalize(&self.state, &mut ctx);
		}
		self.phase = Phase::Finalized;

		self.history.clear();
		self.inputs.clear();
		self.outputs.clear();
	}

	fn stats(&self) -> AgentStats
	{
		self.stats
	}

	fn retained(&self) -> (usize, usize, usize)
	{
		(self.history.len(), self.inputs.len(), self.outputs.len())
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::config::*;

	/// Records the time and size of each batch and optionally forwards
	/// each batch to another agent.
	struct Recorder
	{
		forward: Option<(AgentID, i64)>,
	}

	impl Agent for Recorder
	{
		type State = Vec<(Time, usize)>;

		fn execute_task(&self, state: &mut Self::State, events: &[EventRef], ctx: &mut Context)
		{
			state.push((ctx.time(), events.len()));
			if let Some((to, delay)) = self.forward {
				ctx.schedule_after(to, delay, state.len());
			}
		}
	}

	struct Narrator;

	impl Agent for Narrator
	{
		type State = ();

		fn execute_task(&self, _state: &mut (), events: &[EventRef], ctx: &mut Context)
		{
			log_info!(ctx, "{} events", events.len());
		}
	}

	struct Broken;

	impl Agent for Broken
	{
		type State = ();

		fn initialize(&mut self, _state: &mut (), _ctx: &mut Context) -> InitResult
		{
			Err("missing terrain file".into())
		}

		fn execute_task(&self, _state: &mut (), _events: &[EventRef], _ctx: &mut Context)
		{
		}
	}

	fn from(sender: u32, seq: u64, time: i64) -> EventRef
	{
		let mut event = Event::new(AgentID(1), Time(time));
		event.stamp(AgentID(sender), Time(0), seq);
		EventRef::new(event)
	}

	fn push(queue: &SpinLock<EventQueue>, event: EventRef)
	{
		queue.lock().push(event);
	}

	fn logger() -> Logger
	{
		let mut config = Config::new();
		config.log_level = LogLevel::Error;
		Logger::new(&config)
	}

	#[test]
	fn batches()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: None}, Vec::new());
		assert!(core.initialize(Time(0), &logger).unwrap().is_empty());

		push(&queue, from(2, 0, 4));
		push(&queue, from(3, 0, 2));
		push(&queue, from(4, 0, 4));
		push(&queue, from(5, 0, 4));

		assert!(core.process_next_events(&queue, &logger).executed);
		assert!(core.process_next_events(&queue, &logger).executed);
		assert!(!core.process_next_events(&queue, &logger).executed);

		assert_eq!(core.state(), &vec![(Time(2), 1), (Time(4), 3)]);
		assert_eq!(core.lvt(), Time(4));
		assert_eq!(core.stats().batches, 2);
		assert_eq!(core.stats().events, 4);
		assert_eq!(core.retained(), (3, 4, 0));
	}

	#[test]
	fn sent_events_are_stamped()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: Some((AgentID(9), 2))}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 3));
		let outcome = core.process_next_events(&queue, &logger);
		assert_eq!(outcome.events.len(), 1);

		let event = &outcome.events[0];
		assert_eq!(event.sender(), AgentID(1));
		assert_eq!(event.receiver(), AgentID(9));
		assert_eq!(event.sent_time(), Time(3));
		assert_eq!(event.receive_time(), Time(5));
		assert_eq!(event.payload::<usize>(), Some(&1));
		assert_eq!(event.reference_count(), 2);	// the outcome and the sent event history
	}

	#[test]
	fn straggler_rolls_back()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: Some((AgentID(9), 1))}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 5));
		push(&queue, from(2, 1, 10));
		let first = core.process_next_events(&queue, &logger);
		let second = core.process_next_events(&queue, &logger);
		assert_eq!(core.lvt(), Time(10));
		assert_eq!(first.events[0].receive_time(), Time(6));
		assert_eq!(second.events[0].receive_time(), Time(11));

		push(&queue, from(3, 0, 7));
		let outcome = core.process_next_events(&queue, &logger);
		assert!(outcome.rolled_back);
		assert!(outcome.executed);
		assert_eq!(core.lvt(), Time(7));
		assert_eq!(core.state(), &vec![(Time(5), 1), (Time(7), 1)]);
		assert!(core.history().iter().all(|s| s.time <= Time(7)));

		// the event sent at 10 is cancelled, the one sent at 5 stands
		assert_eq!(outcome.events.len(), 2);
		assert!(outcome.events[0].is_anti_message());
		assert!(outcome.events[0].cancels(&second.events[0]));
		assert!(!outcome.events[1].is_anti_message());
		assert_eq!(outcome.events[1].receive_time(), Time(8));

		// the event at 10 is processed again
		assert_eq!(queue.lock().top_time(), Time(10));
		core.process_next_events(&queue, &logger);
		assert_eq!(core.state(), &vec![(Time(5), 1), (Time(7), 1), (Time(10), 1)]);

		let stats = core.stats();
		assert_eq!(stats.rollbacks, 1);
		assert_eq!(stats.undone_batches, 1);
		assert_eq!(stats.anti_messages, 1);
	}

	#[test]
	fn simultaneous_straggler_rolls_back()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: None}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 5));
		core.process_next_events(&queue, &logger);

		// arrives at the time that was just executed so the batch is redone with both events
		push(&queue, from(3, 0, 5));
		let outcome = core.process_next_events(&queue, &logger);
		assert!(outcome.rolled_back);
		assert_eq!(core.state(), &vec![(Time(5), 2)]);
	}

	#[test]
	fn zero_delay_self_events()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: Some((AgentID(1), 0))}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 3));
		let outcome = core.process_next_events(&queue, &logger);
		for event in outcome.events {
			push(&queue, event);
		}
		let outcome = core.process_next_events(&queue, &logger);
		assert!(!outcome.rolled_back);
		assert_eq!(core.state(), &vec![(Time(3), 1), (Time(3), 1)]);
		assert_eq!(core.lvt(), Time(3));
	}

	#[test]
	fn rollback_cancels_self_events()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: Some((AgentID(1), 10))}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 5));
		let outcome = core.process_next_events(&queue, &logger);
		for event in outcome.events {
			push(&queue, event);	// self event at 15
		}

		push(&queue, from(3, 0, 2));
		let outcome = core.process_next_events(&queue, &logger);
		assert!(outcome.rolled_back);
		assert_eq!(core.state(), &vec![(Time(2), 1)]);
		assert_eq!(outcome.events.len(), 1);	// the new self event at 12, no anti-messages
		assert!(!outcome.events[0].is_anti_message());

		let times: Vec<_> = queue.lock().pending_at(Time(15)).map(|e| e.receive_time()).collect();
		assert!(times.is_empty());
		assert_eq!(queue.lock().top_time(), Time(5));
	}

	#[test]
	fn anti_message_for_processed_event()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: None}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		let positive = from(2, 0, 5);
		push(&queue, positive.increase_reference());
		push(&queue, from(3, 0, 6));
		core.process_next_events(&queue, &logger);
		core.process_next_events(&queue, &logger);

		push(&queue, EventRef::new(positive.anti_message()));
		let outcome = core.process_next_events(&queue, &logger);
		assert!(outcome.rolled_back);
		assert_eq!(core.state(), &vec![(Time(6), 1)]);
		assert_eq!(positive.reference_count(), 1);
	}

	#[test]
	fn garbage_collection()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: Some((AgentID(9), 1))}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();

		for time in 1..5 {
			push(&queue, from(2, time as u64, time));
			core.process_next_events(&queue, &logger);
		}
		assert_eq!(core.retained(), (5, 4, 4));

		core.collect_garbage(Time(3));
		assert_eq!(core.retained(), (3, 2, 2));

		// can still roll back to GVT
		push(&queue, from(3, 0, 3));
		let outcome = core.process_next_events(&queue, &logger);
		assert!(outcome.rolled_back);
		assert_eq!(core.state(), &vec![(Time(1), 1), (Time(2), 1), (Time(3), 2)]);
	}

	#[test]
	fn initialization_failure()
	{
		let logger = logger();
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "broken", Broken, ());
		match core.initialize(Time(0), &logger) {
			Err(KernelError::Initialization{agent, reason}) => {
				assert_eq!(agent, "broken");
				assert_eq!(reason, "missing terrain file");
			},
			_ => panic!("expected an initialization error"),
		}

		push(&queue, from(2, 0, 5));
		assert!(!core.process_next_events(&queue, &logger).executed);
		core.finalize(&logger);
	}

	#[test]
	#[should_panic(expected = "already finalized")]
	fn finalize_twice()
	{
		let logger = logger();
		let mut core = AgentCore::new(AgentID(1), "one", Recorder{forward: None}, Vec::new());
		core.initialize(Time(0), &logger).unwrap();
		core.finalize(&logger);
		core.finalize(&logger);
	}

	#[test]
	fn rollback_discards_undone_output()
	{
		let mut config = Config::new();
		config.colorize = false;
		let logger = Logger::new(&config);
		let queue = SpinLock::new(EventQueue::new());
		let mut core = AgentCore::new(AgentID(1), "one", Narrator, ());
		core.initialize(Time(0), &logger).unwrap();

		push(&queue, from(2, 0, 5));
		push(&queue, from(2, 1, 10));
		core.process_next_events(&queue, &logger);
		core.process_next_events(&queue, &logger);
		let lines: Vec<_> = core.output().iter().map(|(time, _)| time).collect();
		assert_eq!(lines, vec![Time(5), Time(10)]);

		push(&queue, from(3, 0, 7));
		assert!(core.process_next_events(&queue, &logger).rolled_back);
		core.process_next_events(&queue, &logger);
		let lines: Vec<_> = core.output().iter().map(|(time, _)| time).collect();
		assert_eq!(lines, vec![Time(5), Time(7), Time(10)]);	// 10 is logged once

		core.commit_output(Time(8), &logger);
		let lines: Vec<_> = core.output().iter().collect();
		assert_eq!(lines, vec![(Time(10), "1 events")]);

		core.finalize(&logger);
		assert!(core.output().is_empty());
	}
}

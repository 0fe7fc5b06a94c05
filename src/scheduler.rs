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
use crate::agent::*;
use crate::agent_id::*;
use crate::agent_pq::*;
use crate::error::*;
use crate::event::*;
use crate::event_queue::*;
use crate::logging::*;
use crate::sim_time::*;
use crate::spin_lock::*;
use crate::stats::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of `Scheduler::step`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step
{
	/// An agent was stepped, true if it executed a batch.
	Stepped(bool),

	/// Nothing is runnable right now but agents on other threads are busy
	/// and may send more events.
	Idle,

	/// Every queue is empty and no agent is busy.
	Finished,
}

struct AgentSlot
{
	handle: AgentHandle,
	name: String,
	queue: SpinLock<EventQueue>,
	core: Mutex<Box<dyn Schedulable>>,
	busy: AtomicBool,		// only changed with the agent PQ locked
	enabled: AtomicBool,	// false if the agent failed to initialize
	lvt: AtomicTime,		// mirrors the core's LVT so delivery doesn't need the core lock
}

/// Owns the agents and picks which one runs next. All methods that are
/// used while the simulation runs take &self so that worker threads can
/// share the scheduler.
///
/// Locks are always acquired in this order: agent PQ, then an agent's queue.
/// An agent's core lock is never held while acquiring the PQ lock.
pub struct Scheduler
{
	agents: BTreeMap<AgentID, AgentSlot>,
	agent_pq: Mutex<AgentPQ>,
	busy_count: AtomicUsize,	// only changed with the agent PQ locked
	lgvt: AtomicTime,
	stop_time: Time,
	logger: Arc<Logger>,

	steps: AtomicU64,
	annihilated: AtomicU64,
	stragglers: AtomicU64,
	rejected: AtomicU64,
	discarded: AtomicU64,
}

impl Scheduler
{
	pub fn new(logger: Arc<Logger>) -> Scheduler
	{
		Scheduler {
			agents: BTreeMap::new(),
			agent_pq: Mutex::new(AgentPQ::new()),
			busy_count: AtomicUsize::new(0),
			lgvt: AtomicTime::new(Time::NEG_INFINITY),
			stop_time: Time::INFINITY,
			logger,
			steps: AtomicU64::new(0),
			annihilated: AtomicU64::new(0),
			stragglers: AtomicU64::new(0),
			rejected: AtomicU64::new(0),
			discarded: AtomicU64::new(0),
		}
	}

	/// Events received at or after the stop time are discarded.
	pub fn set_stop_time(&mut self, time: Time)
	{
		self.stop_time = time;
	}

	pub fn stop_time(&self) -> Time
	{
		self.stop_time
	}

	/// Returns false if an agent with the same id was already added.
	pub fn add_agent_to_scheduler(&mut self, agent: Box<dyn Schedulable>) -> bool
	{
		let id = agent.id();
		if self.agents.contains_key(&id) {
			log_warning!(self, "agent {} ({}) is already registered", id, agent.name());
			return false;
		}

		let name = agent.name().to_string();
		let handle = lock(&self.agent_pq).push(id, Time::INFINITY);
		let slot = AgentSlot {
			handle,
			name,
			queue: SpinLock::new(EventQueue::new()),
			core: Mutex::new(agent),
			busy: AtomicBool::new(false),
			enabled: AtomicBool::new(true),
			lvt: AtomicTime::new(Time::NEG_INFINITY),
		};
		log_debug!(self, "registered agent {} ({})", id, slot.name);
		self.agents.insert(id, slot);
		true
	}

	pub fn contains(&self, id: AgentID) -> bool
	{
		self.agents.contains_key(&id)
	}

	pub fn len(&self) -> usize
	{
		self.agents.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.agents.is_empty()
	}

	pub fn name(&self, id: AgentID) -> Option<&str>
	{
		self.agents.get(&id).map(|slot| slot.name.as_str())
	}

	pub fn lvt(&self, id: AgentID) -> Option<Time>
	{
		self.agents.get(&id).map(|slot| slot.lvt.load())
	}

	/// Numbers of snapshots, processed events, and sent events the agent retains.
	pub fn retained(&self, id: AgentID) -> Option<(usize, usize, usize)>
	{
		self.agents.get(&id).map(|slot| lock(&slot.core).retained())
	}

	/// Hands the event to its receiver. Returns false (and drops the event) if
	/// the receiver is unknown. This is also the entry point for events that
	/// arrived from another process.
	pub fn schedule_event(&self, event: EventRef) -> bool
	{
		let receiver = event.receiver();
		let slot = match self.agents.get(&receiver) {
			Some(slot) if slot.enabled.load(Ordering::Acquire) => slot,
			_ => {
				self.rejected.fetch_add(1, Ordering::Relaxed);
				log_warning!(self, "dropping {}: agent {} isn't registered", event, receiver);
				return false;
			}
		};

		if event.receive_time() >= self.stop_time {
			self.discarded.fetch_add(1, Ordering::Relaxed);
			log_excessive!(self, "discarding {}: at or after the stop time", event);
			return true;
		}

		let lvt = slot.lvt.load();
		if event.receive_time() < lvt {
			self.stragglers.fetch_add(1, Ordering::Relaxed);
			log_debug!(self, "{} is a straggler for {} which is at {}", event, slot.name, lvt);
		}

		let pushed = slot.queue.lock().push(event);
		if pushed == Pushed::Annihilated {
			self.annihilated.fetch_add(1, Ordering::Relaxed);
		}

		let mut pq = lock(&self.agent_pq);
		if !slot.busy.load(Ordering::Relaxed) {
			let top = slot.queue.lock().top_time();
			pq.update(slot.handle, top);
		}
		true
	}

	/// The agent that would be stepped next.
	pub fn top(&self) -> Option<AgentID>
	{
		lock(&self.agent_pq).top()
	}

	/// Receive time of the earliest pending event, INFINITY if there is none.
	/// Agents that are being stepped are not included so with multiple workers
	/// this is only exact when no worker is inside `step`.
	pub fn next_event_time(&self) -> Time
	{
		lock(&self.agent_pq).top_time()
	}

	/// Estimate of GVT updated after every step.
	pub fn lgvt(&self) -> Time
	{
		self.lgvt.load()
	}

	/// Steps the agent with the earliest pending event and returns true if it
	/// executed a batch (an agent may only roll back).
	pub fn process_next_agent_events(&self) -> bool
	{
		self.step() == Step::Stepped(true)
	}

	/// Safe to call from multiple threads at once. The agent is marked busy
	/// (and given an infinite key) while it runs so that no other thread
	/// picks it.
	pub fn step(&self) -> Step
	{
		let slot = {
			let mut pq = lock(&self.agent_pq);
			match pq.top_key() {
				Some((time, id)) if time < Time::INFINITY => {
					let slot = &self.agents[&id];
					slot.busy.store(true, Ordering::Relaxed);
					self.busy_count.fetch_add(1, Ordering::Relaxed);
					pq.update(slot.handle, Time::INFINITY);
					slot
				},
				_ => {
					return if self.busy_count.load(Ordering::Relaxed) == 0 {Step::Finished} else {Step::Idle};
				}
			}
		};

		let outcome = {
			let mut core = lock(&slot.core);
			let outcome = core.process_next_events(&slot.queue, &self.logger);
			slot.lvt.store(core.lvt());
			outcome
		};

		let executed = outcome.executed;
		let worked = executed || outcome.rolled_back;
		for event in outcome.events {
			self.schedule_event(event);
		}

		{
			let mut pq = lock(&self.agent_pq);
			slot.busy.store(false, Ordering::Relaxed);
			self.busy_count.fetch_sub(1, Ordering::Relaxed);
			let top = slot.queue.lock().top_time();
			pq.update(slot.handle, top);
			self.lgvt.store(pq.top_time());
		}

		if worked {
			self.steps.fetch_add(1, Ordering::Relaxed);
		}
		Step::Stepped(executed)
	}

	/// Initializes every agent in id order. Agents that fail are taken out
	/// of the simulation: their pending events are dropped and events sent
	/// to them are rejected.
	pub fn initialize_agents(&self, start_time: Time) -> Vec<KernelError>
	{
		let mut failures = Vec::new();
		for (id, slot) in self.agents.iter() {
			let result = lock(&slot.core).initialize(start_time, &self.logger);
			match result {
				Ok(events) => {
					slot.lvt.store(start_time);
					log_excessive!(self, "initialized agent {} ({}) with {} events", id, slot.name, events.len());
					for event in events {
						self.schedule_event(event);
					}
				},
				Err(err) => {
					log_error!(self, "{}", err);
					slot.enabled.store(false, Ordering::Release);

					let mut pq = lock(&self.agent_pq);
					slot.queue.lock().clear();
					pq.update(slot.handle, Time::INFINITY);
					failures.push(err);
				}
			}
		}
		self.lgvt.store(self.next_event_time());
		failures
	}

	/// Fossil collection, only call this while no worker is stepping agents.
	pub fn collect_garbage(&self, gvt: Time)
	{
		for slot in self.agents.values() {
			lock(&slot.core).collect_garbage(gvt);
		}
	}

	/// Logs what the agents logged before gvt.
	pub fn commit_output(&self, gvt: Time)
	{
		for slot in self.agents.values() {
			lock(&slot.core).commit_output(gvt, &self.logger);
		}
	}

	/// Calls finalize on every agent and releases whatever they still hold.
	pub fn finalize_agents(&self)
	{
		for slot in self.agents.values() {
			lock(&slot.core).finalize(&self.logger);
			slot.queue.lock().clear();
		}
	}

	pub fn fill_stats(&self, stats: &mut SimulationStats)
	{
		stats.steps = self.steps.load(Ordering::Relaxed);
		stats.annihilated = self.annihilated.load(Ordering::Relaxed);
		stats.stragglers = self.stragglers.load(Ordering::Relaxed);
		stats.rejected = self.rejected.load(Ordering::Relaxed);
		stats.discarded = self.discarded.load(Ordering::Relaxed);
		stats.agents = self.agents.iter().map(|(id, slot)| (*id, slot.name.clone(), lock(&slot.core).stats())).collect();
	}

	/// Returns the agent PQ's forest, for debugging.
	pub fn pretty_print(&self) -> String
	{
		lock(&self.agent_pq).pretty_print()
	}

	fn log(&self, level: LogLevel, message: &str)
	{
		self.logger.log(self.lgvt.load(), level, "scheduler", message);
	}
}

// A poisoned lock means a worker panicked while stepping an agent. That
// panic is propagated when the worker is joined so the data is still usable
// for the teardown that follows.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T>
{
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::config::*;
	use crate::context::*;
	use crate::event::tests::Counted;

	type Journal = Arc<Mutex<Vec<(AgentID, Time, usize)>>>;

	struct Recorder
	{
		journal: Journal,
		forward: Option<AgentID>,
	}

	impl Agent for Recorder
	{
		type State = u32;

		fn execute_task(&self, state: &mut u32, events: &[EventRef], ctx: &mut Context)
		{
			*state += 1;
			self.journal.lock().unwrap().push((ctx.id(), ctx.time(), events.len()));
			if let Some(to) = self.forward {
				ctx.schedule_after(to, 2, *state);
			}
		}
	}

	fn scheduler(ids: &[u32], journal: &Journal) -> Scheduler
	{
		let agents: Vec<_> = ids.iter().map(|&id| (id, None)).collect();
		build(&agents, journal)
	}

	// Agents are (id, forward to).
	fn build(agents: &[(u32, Option<u32>)], journal: &Journal) -> Scheduler
	{
		let mut config = Config::new();
		config.log_level = LogLevel::Error;
		let mut scheduler = Scheduler::new(Arc::new(Logger::new(&config)));
		for &(id, forward) in agents {
			let agent = Recorder{journal: journal.clone(), forward: forward.map(AgentID)};
			let core = AgentCore::new(AgentID(id), &format!("agent-{}", id), agent, 0);
			assert!(scheduler.add_agent_to_scheduler(Box::new(core)));
		}
		assert!(scheduler.initialize_agents(Time(0)).is_empty());
		scheduler
	}

	fn event(to: u32, time: i64) -> EventRef
	{
		EventRef::new(Event::new(AgentID(to), Time(time)))
	}

	#[test]
	fn picks_the_earliest_agent()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1, 2, 3], &journal);
		assert!(scheduler.schedule_event(event(1, 1)));
		assert!(scheduler.schedule_event(event(1, 3)));
		assert!(scheduler.schedule_event(event(3, 2)));

		assert_eq!(scheduler.top(), Some(AgentID(1)));
		assert!(scheduler.process_next_agent_events());
		assert_eq!(scheduler.top(), Some(AgentID(3)));
		assert!(scheduler.process_next_agent_events());
		assert_eq!(scheduler.top(), Some(AgentID(1)));
		assert!(scheduler.process_next_agent_events());

		assert!(!scheduler.process_next_agent_events());
		assert_eq!(scheduler.step(), Step::Finished);
		assert_eq!(scheduler.next_event_time(), Time::INFINITY);

		let journal = journal.lock().unwrap();
		assert_eq!(*journal, vec![(AgentID(1), Time(1), 1), (AgentID(3), Time(2), 1), (AgentID(1), Time(3), 1)]);
	}

	#[test]
	fn simultaneous_events_are_one_batch()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1, 2], &journal);
		for _ in 0..3 {
			scheduler.schedule_event(event(2, 5));
		}
		scheduler.schedule_event(event(2, 4));
		scheduler.schedule_event(event(2, 6));

		while scheduler.process_next_agent_events() {
		}

		let journal = journal.lock().unwrap();
		assert_eq!(*journal, vec![(AgentID(2), Time(4), 1), (AgentID(2), Time(5), 3), (AgentID(2), Time(6), 1)]);
	}

	#[test]
	fn unknown_receivers_are_rejected()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1], &journal);
		let drops = Arc::new(AtomicUsize::new(0));
		let event = EventRef::new(Event::with_payload(AgentID(42), Time(3), Counted(drops.clone())));

		assert!(!scheduler.schedule_event(event));
		assert_eq!(drops.load(Ordering::SeqCst), 1);

		let mut stats = SimulationStats::default();
		scheduler.fill_stats(&mut stats);
		assert_eq!(stats.rejected, 1);
	}

	#[test]
	fn shared_events_are_released_once()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1], &journal);
		let drops = Arc::new(AtomicUsize::new(0));
		let event = EventRef::new(Event::with_payload(AgentID(1), Time(3), Counted(drops.clone())));
		let held = event.increase_reference();

		assert!(scheduler.schedule_event(event));
		assert!(scheduler.process_next_agent_events());
		assert_eq!(held.reference_count(), 2);	// the processed event history holds the other one

		held.decrease_reference();
		assert_eq!(drops.load(Ordering::SeqCst), 0);

		scheduler.finalize_agents();
		assert_eq!(drops.load(Ordering::SeqCst), 1);
		drop(scheduler);
		assert_eq!(drops.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn duplicate_agents()
	{
		let journal = Journal::default();
		let mut scheduler = scheduler(&[1, 2], &journal);
		let agent = Recorder{journal: journal.clone(), forward: None};
		assert!(!scheduler.add_agent_to_scheduler(Box::new(AgentCore::new(AgentID(2), "again", agent, 0))));
		assert_eq!(scheduler.len(), 2);
		assert_eq!(scheduler.name(AgentID(2)), Some("agent-2"));
	}

	#[test]
	fn stop_time_discards_events()
	{
		let journal = Journal::default();
		let mut scheduler = scheduler(&[1], &journal);
		scheduler.set_stop_time(Time(10));
		assert!(scheduler.schedule_event(event(1, 10)));
		assert!(scheduler.schedule_event(event(1, 9)));
		assert_eq!(scheduler.next_event_time(), Time(9));

		assert!(scheduler.process_next_agent_events());
		assert!(!scheduler.process_next_agent_events());

		let mut stats = SimulationStats::default();
		scheduler.fill_stats(&mut stats);
		assert_eq!(stats.discarded, 1);
		assert_eq!(stats.steps, 1);
	}

	#[test]
	fn pending_events_can_be_cancelled()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1], &journal);
		let mut event = Event::new(AgentID(1), Time(4));
		event.stamp(AgentID(7), Time(1), 3);
		let event = EventRef::new(event);

		scheduler.schedule_event(event.increase_reference());
		scheduler.schedule_event(EventRef::new(event.anti_message()));
		assert_eq!(scheduler.next_event_time(), Time::INFINITY);
		assert!(!scheduler.process_next_agent_events());

		let mut stats = SimulationStats::default();
		scheduler.fill_stats(&mut stats);
		assert_eq!(stats.annihilated, 1);
		assert!(journal.lock().unwrap().is_empty());
	}

	#[test]
	fn stragglers_roll_back_the_receiver()
	{
		let journal = Journal::default();
		let scheduler = build(&[(1, Some(2)), (2, None)], &journal);

		scheduler.schedule_event(event(1, 10));
		assert!(scheduler.process_next_agent_events());
		assert_eq!(scheduler.lvt(AgentID(1)), Some(Time(10)));
		assert_eq!(scheduler.next_event_time(), Time(12));

		// agent 1 sent 2 an event at 12 which the rollback cancels
		scheduler.schedule_event(event(1, 3));
		assert_eq!(scheduler.top(), Some(AgentID(1)));
		while scheduler.process_next_agent_events() {
		}

		let expected = vec![
			(AgentID(1), Time(10), 1),
			(AgentID(1), Time(3), 1),
			(AgentID(2), Time(5), 1),
			(AgentID(1), Time(10), 1),
			(AgentID(2), Time(12), 1)];
		assert_eq!(*journal.lock().unwrap(), expected);

		let mut stats = SimulationStats::default();
		scheduler.fill_stats(&mut stats);
		assert_eq!(stats.stragglers, 1);
		assert_eq!(stats.annihilated, 1);
		assert_eq!(stats.totals().rollbacks, 1);
		assert_eq!(stats.totals().anti_messages, 1);
	}

	#[test]
	fn rolling_back_alone_is_not_processing()
	{
		let journal = Journal::default();
		let scheduler = scheduler(&[1], &journal);
		let mut event = Event::new(AgentID(1), Time(4));
		event.stamp(AgentID(7), Time(1), 3);
		let event = EventRef::new(event);

		scheduler.schedule_event(event.increase_reference());
		assert!(scheduler.process_next_agent_events());

		// the anti-message undoes the only batch, leaving nothing to execute
		scheduler.schedule_event(EventRef::new(event.anti_message()));
		assert_eq!(scheduler.step(), Step::Stepped(false));
		assert_eq!(scheduler.step(), Step::Finished);

		let mut stats = SimulationStats::default();
		scheduler.fill_stats(&mut stats);
		assert_eq!(stats.totals().rollbacks, 1);
		assert_eq!(stats.steps, 2);
		assert_eq!(journal.lock().unwrap().len(), 1);
		assert_eq!(event.reference_count(), 1);
	}
}

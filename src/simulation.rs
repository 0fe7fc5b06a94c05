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
use crate::config::*;
use crate::error::*;
use crate::event::*;
use crate::gvt::*;
use crate::listener::*;
use crate::logging::*;
use crate::scheduler::*;
use crate::sim_time::*;
use crate::stats::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use time::precise_time_s;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase
{
	Setup,
	Initialized,
	Ran,
	Finalized,
}

/// This is the top-level data structure. Agents are registered with it,
/// then start runs the simulation until every agent's queue is empty (events
/// at or past the stop time are never queued), and finally finalize lets
/// agents report their results.
pub struct Simulation
{
	config: Config,
	scheduler: Scheduler,
	gvt: GVTManager,
	logger: Arc<Logger>,
	phase: Phase,
	stats: SimulationStats,
}

impl Simulation
{
	/// Panics if the config is invalid.
	pub fn new(config: Config) -> Simulation
	{
		match Simulation::try_new(config) {
			Ok(sim) => sim,
			Err(err) => panic!("{}", err),
		}
	}

	pub fn try_new(config: Config) -> Result<Simulation, KernelError>
	{
		config.validate()?;

		let logger = Arc::new(Logger::new(&config));
		let mut scheduler = Scheduler::new(logger.clone());
		scheduler.set_stop_time(config.stop_time);
		let gvt = GVTManager::new(config.gvt_period, config.collect_garbage, logger.clone());
		Ok(Simulation {
			config,
			scheduler,
			gvt,
			logger,
			phase: Phase::Setup,
			stats: SimulationStats::default(),
		})
	}

	pub fn config(&self) -> &Config
	{
		&self.config
	}

	pub fn set_start_time(&mut self, time: Time)
	{
		assert!(self.phase == Phase::Setup, "start time can't be changed after initialization");
		assert!(time < self.config.stop_time, "start time ({}) should be before the stop time ({})", time, self.config.stop_time);
		self.config.start_time = time;
	}

	pub fn set_stop_time(&mut self, time: Time)
	{
		assert!(self.phase == Phase::Setup, "stop time can't be changed after initialization");
		assert!(time > self.config.start_time, "stop time ({}) should be after the start time ({})", time, self.config.start_time);
		self.config.stop_time = time;
		self.scheduler.set_stop_time(time);
	}

	pub fn set_listener(&mut self, listener: Box<dyn SimulationListener>)
	{
		self.gvt.set_listener(listener);
	}

	/// Returns false if an agent with the same id was already registered.
	pub fn register_agent<A>(&mut self, id: AgentID, name: &str, agent: A, state: A::State) -> bool
		where A: Agent + 'static
	{
		self.add_agent(Box::new(AgentCore::new(id, name, agent, state)))
	}

	pub fn try_register_agent<A>(&mut self, id: AgentID, name: &str, agent: A, state: A::State) -> Result<(), KernelError>
		where A: Agent + 'static
	{
		if self.register_agent(id, name, agent, state) {
			Ok(())
		} else {
			Err(KernelError::DuplicateAgent(id))
		}
	}

	/// Registers an agent that doesn't use `AgentCore`.
	pub fn add_agent(&mut self, agent: Box<dyn Schedulable>) -> bool
	{
		assert!(self.phase == Phase::Setup, "agents must be registered before the simulation is initialized");
		self.scheduler.add_agent_to_scheduler(agent)
	}

	/// Used to seed the simulation with events (agents can also schedule
	/// events from initialize). Returns false if the receiver is unknown.
	pub fn schedule_event(&self, event: Event) -> bool
	{
		self.scheduler.schedule_event(EventRef::new(event))
	}

	pub fn try_schedule_event(&self, event: Event) -> Result<(), KernelError>
	{
		let receiver = event.receiver();
		let description = event.to_string();
		if self.schedule_event(event) {
			Ok(())
		} else {
			Err(KernelError::UnknownReceiver{event: description, receiver})
		}
	}

	/// Entry point for communicators: events that arrived from another
	/// process are delivered exactly like local events.
	pub fn deliver(&self, event: EventRef) -> bool
	{
		self.scheduler.schedule_event(event)
	}

	pub fn scheduler(&self) -> &Scheduler
	{
		&self.scheduler
	}

	/// The last GVT computed.
	pub fn gvt(&self) -> Option<Time>
	{
		self.gvt.gvt()
	}

	pub fn stats(&self) -> &SimulationStats
	{
		&self.stats
	}

	/// Calls initialize on every agent. Normally this is done by start but
	/// it can be called first to seed events after agents have initialized.
	/// Returns the agents that failed, these take no further part in the
	/// simulation.
	pub fn initialize(&mut self) -> Vec<KernelError>
	{
		assert!(self.phase == Phase::Setup, "the simulation was already initialized");

		log_info!(self, "initializing {} agents", self.scheduler.len());
		let failures = self.scheduler.initialize_agents(self.config.start_time);
		self.phase = Phase::Initialized;
		failures
	}

	/// Processes events until there are none left.
	pub fn start(&mut self) -> Vec<KernelError>
	{
		let failures = if self.phase == Phase::Setup {self.initialize()} else {Vec::new()};
		assert!(self.phase == Phase::Initialized, "the simulation was already run");

		let start = precise_time_s();
		if self.config.num_threads > 1 {
			log_info!(self, "running with {} threads", self.config.num_threads);
			self.run_threaded();
		} else {
			self.run_single();
		}

		// Everything has been processed so this is the final GVT (the stop
		// time unless that is infinite).
		self.gvt.compute(&self.scheduler);
		self.phase = Phase::Ran;

		self.stats.elapsed_secs = precise_time_s() - start;
		self.update_stats();
		log_info!(self, "finished: {}", self.stats);
		failures
	}

	/// Calls finalize on every agent. Must be called exactly once.
	pub fn finalize(&mut self)
	{
		assert!(self.phase != Phase::Finalized, "the simulation was already finalized");

		self.scheduler.finalize_agents();
		self.phase = Phase::Finalized;
		self.update_stats();
		for &(id, ref name, ref stats) in self.stats.agents.iter() {
			log_debug!(self, "agent {} ({}): {}", id, name, stats);
		}
	}

	/// Starts the simulation and then finalizes it.
	pub fn run(&mut self) -> Vec<KernelError>
	{
		let failures = self.start();
		self.finalize();
		failures
	}

	fn run_single(&mut self)
	{
		let mut steps = 0;
		loop {
			match self.scheduler.step() {
				Step::Stepped(_) => {
					steps += 1;
					if self.gvt.is_due(steps) {
						self.gvt.compute(&self.scheduler);
					}
				},
				Step::Idle => thread::yield_now(),
				Step::Finished => break,
			}
		}
	}

	// Workers step agents while holding the gate for reading. GVT is
	// computed with the gate held for writing so that no events are in
	// flight while the queues are examined.
	fn run_threaded(&mut self)
	{
		let num_threads = self.config.num_threads;
		let gate = RwLock::new(());
		let steps = AtomicU64::new(0);
		let scheduler = &self.scheduler;
		let gvt = Mutex::new(&mut self.gvt);

		thread::scope(|scope| {
			for _ in 0..num_threads {
				scope.spawn(|| {
					loop {
						let step = {
							let _entered = gate.read().unwrap_or_else(PoisonError::into_inner);
							scheduler.step()
						};
						match step {
							Step::Stepped(_) => {
								let count = steps.fetch_add(1, Ordering::Relaxed) + 1;
								let due = gvt.lock().unwrap_or_else(PoisonError::into_inner).is_due(count);
								if due {
									let _stopped = gate.write().unwrap_or_else(PoisonError::into_inner);
									gvt.lock().unwrap_or_else(PoisonError::into_inner).compute(scheduler);
								}
							},
							Step::Idle => thread::yield_now(),
							Step::Finished => break,
						}
					}
				});
			}
		});
	}

	fn update_stats(&mut self)
	{
		self.scheduler.fill_stats(&mut self.stats);
		self.stats.gvt = self.gvt.gvt();
		self.stats.gvt_computations = self.gvt.computations();
	}

	fn log(&self, level: LogLevel, message: &str)
	{
		let time = self.gvt.gvt().unwrap_or(self.config.start_time);
		self.logger.log(time, level, "simulation", message);
	}
}

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
use crate::listener::*;
use crate::logging::*;
use crate::scheduler::*;
use crate::sim_time::*;
use std::cmp;
use std::sync::Arc;

/// Computes global virtual time: the time before which no agent can be
/// rolled back. Since every rollback is caused by a pending event (or
/// anti-message) and agents never send events into their own past, GVT is
/// the earliest receive time across every agent's queue. That only holds
/// while events aren't in flight so compute must be called when no worker
/// is inside `Scheduler::step`.
pub struct GVTManager
{
	gvt: Option<Time>,
	period: usize,
	collect_garbage: bool,
	computations: u64,
	listener: Option<Box<dyn SimulationListener>>,
	logger: Arc<Logger>,
}

impl GVTManager
{
	pub fn new(period: usize, collect_garbage: bool, logger: Arc<Logger>) -> GVTManager
	{
		assert!(period > 0, "GVT period should be positive");
		GVTManager{gvt: None, period, collect_garbage, computations: 0, listener: None, logger}
	}

	pub fn set_listener(&mut self, listener: Box<dyn SimulationListener>)
	{
		self.listener = Some(listener);
	}

	/// None until the first computation.
	pub fn gvt(&self) -> Option<Time>
	{
		self.gvt
	}

	pub fn computations(&self) -> u64
	{
		self.computations
	}

	/// True if GVT should be recomputed after this many steps.
	pub fn is_due(&self, steps: u64) -> bool
	{
		steps > 0 && steps % (self.period as u64) == 0
	}

	pub fn compute(&mut self, scheduler: &Scheduler) -> Time
	{
		let gvt = cmp::min(scheduler.next_event_time(), scheduler.stop_time());
		let advanced = match self.gvt {
			Some(old) => {
				assert!(gvt >= old, "GVT went backwards from {} to {}", old, gvt);
				gvt > old
			},
			None => true,
		};
		self.gvt = Some(gvt);
		self.computations += 1;

		if advanced {
			log_debug!(self, "GVT advanced to {}", gvt);
			scheduler.commit_output(gvt);
			if self.collect_garbage {
				scheduler.collect_garbage(gvt);
			}
		}
		if let Some(ref mut listener) = self.listener {
			listener.garbage_collection_done(gvt);
		}
		gvt
	}

	fn log(&self, level: LogLevel, message: &str)
	{
		self.logger.log(self.gvt.unwrap_or(Time::NEG_INFINITY), level, "simulation", message);
	}
}

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
use crate::sim_time::*;
use std::fmt;
use std::ops::AddAssign;

/// Counters maintained by each agent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AgentStats
{
	/// Number of times execute_task was called.
	pub batches: u64,

	/// Number of events handed to execute_task, including re-executions.
	pub events: u64,

	pub rollbacks: u64,

	/// Number of batches undone by rollbacks.
	pub undone_batches: u64,

	pub anti_messages: u64,
}

impl AddAssign for AgentStats
{
	fn add_assign(&mut self, rhs: AgentStats)
	{
		self.batches += rhs.batches;
		self.events += rhs.events;
		self.rollbacks += rhs.rollbacks;
		self.undone_batches += rhs.undone_batches;
		self.anti_messages += rhs.anti_messages;
	}
}

impl fmt::Display for AgentStats
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		write!(formatter, "{} batches, {} events, {} rollbacks ({} batches undone), {} anti-messages",
			self.batches, self.events, self.rollbacks, self.undone_batches, self.anti_messages)
	}
}

/// Totals for a run, see `Simulation::stats`.
#[derive(Clone, Debug, Default)]
pub struct SimulationStats
{
	/// Number of processing steps that did something.
	pub steps: u64,

	pub gvt_computations: u64,

	/// The last GVT computed.
	pub gvt: Option<Time>,

	/// Events cancelled by an anti-message before they were processed.
	pub annihilated: u64,

	/// Events which arrived in their receiver's past.
	pub stragglers: u64,

	/// Events for unknown (or failed) agents.
	pub rejected: u64,

	/// Events received at or after the stop time.
	pub discarded: u64,

	/// Wall clock time spent running.
	pub elapsed_secs: f64,

	pub agents: Vec<(AgentID, String, AgentStats)>,
}

impl SimulationStats
{
	pub fn totals(&self) -> AgentStats
	{
		let mut totals = AgentStats::default();
		for &(_, _, stats) in self.agents.iter() {
			totals += stats;
		}
		totals
	}

	/// Fraction of executed batches that were not rolled back.
	pub fn efficiency(&self) -> f64
	{
		let totals = self.totals();
		if totals.batches > 0 {
			(totals.batches - totals.undone_batches) as f64/(totals.batches as f64)
		} else {
			1.0
		}
	}
}

impl fmt::Display for SimulationStats
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		let gvt = self.gvt.map_or("none".to_string(), |t| t.to_string());
		write!(formatter, "{} steps in {:.3}s, gvt {} ({} computations), {} stragglers, {} annihilated, {} rejected, {} discarded, {:.1}% efficient, {}",
			self.steps, self.elapsed_secs, gvt, self.gvt_computations, self.stragglers, self.annihilated,
			self.rejected, self.discarded, 100.0*self.efficiency(), self.totals())
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn efficiency()
	{
		let mut stats = SimulationStats::default();
		assert_eq!(stats.efficiency(), 1.0);

		let agent = AgentStats{batches: 8, events: 10, rollbacks: 1, undone_batches: 2, anti_messages: 3};
		stats.agents.push((AgentID(1), "a".to_string(), agent));
		stats.agents.push((AgentID(2), "b".to_string(), AgentStats{batches: 2, ..AgentStats::default()}));
		assert_eq!(stats.totals().batches, 10);
		assert_eq!(stats.efficiency(), 0.8);
	}
}

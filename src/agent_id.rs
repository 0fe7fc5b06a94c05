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
use std::fmt;

/// To make lifetime management easier agents are referenced using a small
/// integer instead of a rust reference. IDs are chosen by the model (not
/// by the kernel) and must be unique across the simulation. Their ordering
/// is used to break ties between agents with the same top time.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AgentID(pub u32);

/// Sender of events that were not created by an agent, e.g. events
/// injected by the driver before the simulation starts.
pub const NO_AGENT: AgentID = AgentID(std::u32::MAX);

impl fmt::Display for AgentID
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		if *self == NO_AGENT {
			write!(formatter, "none")
		} else {
			write!(formatter, "{}", self.0)
		}
	}
}

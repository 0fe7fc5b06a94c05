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

/// Notified as the simulation makes irrevocable progress. This is the
/// hook for archiving policies and for communicators that need to know
/// which messages can no longer be cancelled.
pub trait SimulationListener: Send
{
	/// Called after each GVT computation once snapshots and event histories
	/// older than gvt have been dropped (if garbage collection is enabled).
	/// Successive calls never pass a smaller gvt.
	fn garbage_collection_done(&mut self, gvt: Time);
}

/// Closures work as listeners.
impl<F> SimulationListener for F
	where F: FnMut(Time) + Send
{
	fn garbage_collection_done(&mut self, gvt: Time)
	{
		self(gvt)
	}
}

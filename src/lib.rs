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
//! Kernel for optimistic (time warp) parallel discrete event simulations.
//! Models implement `Agent`, register agents with a `Simulation`, seed it
//! with a few `Event`s, and run it on one or more threads.
pub mod logging;	// first so that the log macros are visible to the other modules

pub mod agent;
pub mod agent_id;
pub mod agent_pq;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod event_queue;
pub mod gvt;
pub mod listener;
pub mod scheduler;
pub mod sim_output;
pub mod sim_time;
pub mod simulation;
pub mod spin_lock;
pub mod state_history;
pub mod stats;

pub use crate::agent::*;
pub use crate::agent_id::*;
pub use crate::agent_pq::*;
pub use crate::config::*;
pub use crate::context::*;
pub use crate::error::*;
pub use crate::event::*;
pub use crate::event_queue::*;
pub use crate::gvt::*;
pub use crate::listener::*;
pub use crate::logging::*;
pub use crate::scheduler::*;
pub use crate::sim_output::*;
pub use crate::sim_time::*;
pub use crate::simulation::*;
pub use crate::spin_lock::*;
pub use crate::state_history::*;
pub use crate::stats::*;

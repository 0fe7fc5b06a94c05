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
use thiserror::Error;

/// Conditions the kernel recovers from. Broken ownership or heap
/// invariants are programming errors and panic instead.
#[derive(Debug, Error)]
pub enum KernelError
{
	#[error("agent {0} is already registered")]
	DuplicateAgent(AgentID),

	#[error("{event} was scheduled for unknown agent {receiver}")]
	UnknownReceiver {event: String, receiver: AgentID},

	#[error("agent {agent} failed to initialize: {reason}")]
	Initialization {agent: String, reason: String},

	#[error("{0}")]
	InvalidOption(String),
}

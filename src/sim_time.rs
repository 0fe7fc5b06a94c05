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
use std::sync::atomic::{AtomicI64, Ordering};

/// To better support deterministic execution time is stored
/// using 64-bit integers. The kernel doesn't care about units:
/// models decide what a tick means.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Time(pub i64);	// signed so that "before the start" is representable

impl Time
{
	/// Used for the top time of agents with nothing to do and as the
	/// default stop time.
	pub const INFINITY: Time = Time(i64::MAX);

	/// Earlier than any event can be.
	pub const NEG_INFINITY: Time = Time(i64::MIN);

	pub const ZERO: Time = Time(0);

	pub fn is_infinite(self) -> bool
	{
		self == Time::INFINITY || self == Time::NEG_INFINITY
	}

	/// Returns the time delta ticks after self. Saturates at INFINITY.
	pub fn after(self, delta: i64) -> Time
	{
		assert!(delta >= 0, "delta ({}) is negative", delta);
		if self.is_infinite() {
			self
		} else {
			Time(self.0.saturating_add(delta))
		}
	}
}

impl fmt::Display for Time
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		match *self {
			Time::INFINITY => write!(formatter, "inf"),
			Time::NEG_INFINITY => write!(formatter, "-inf"),
			Time(t) => write!(formatter, "{}", t),
		}
	}
}

/// A `Time` that can be shared between worker threads. Used for the
/// LGVT estimate and for the LVT mirror the scheduler reads while an
/// agent is busy on another thread.
#[derive(Debug)]
pub struct AtomicTime(AtomicI64);

impl AtomicTime
{
	pub fn new(time: Time) -> AtomicTime
	{
		AtomicTime(AtomicI64::new(time.0))
	}

	pub fn load(&self) -> Time
	{
		Time(self.0.load(Ordering::Acquire))
	}

	pub fn store(&self, time: Time)
	{
		self.0.store(time.0, Ordering::Release);
	}
}

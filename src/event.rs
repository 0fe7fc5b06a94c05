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
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Positive events carry work, anti-messages cancel a positive event
/// that was sent by a computation which has since been rolled back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sign
{
	Positive,
	Anti,
}

/// Raw bytes an event was decoded from when it arrived from another
/// process. Communicators typically implement this on a pooled buffer
/// so that dropping the frame hands the buffer back to the pool.
pub trait WireFrame: Send + Sync
{
	fn bytes(&self) -> &[u8];
}

impl WireFrame for Vec<u8>
{
	fn bytes(&self) -> &[u8]
	{
		self
	}
}

impl WireFrame for Box<[u8]>
{
	fn bytes(&self) -> &[u8]
	{
		self
	}
}

/// Where the event's storage came from. Dropping an `Event` releases
/// whichever of these it owns: a boxed payload for events created by
/// agents in this process or the wire frame for events received from
/// a communicator. Callers never need to care which.
pub enum Origin
{
	Local(Option<Box<dyn Any + Send + Sync>>),
	Wire(Box<dyn WireFrame>),
}

/// Events are scheduled to be sent to an agent at a particular `Time`.
/// Once an event has been handed to the kernel it is shared (via
/// `EventRef`) between the receiver's queue, the receiver's processed
/// event history and the sender's sent event history and is no longer
/// mutable.
pub struct Event
{
	sender: AgentID,
	receiver: AgentID,
	sent_time: Time,
	receive_time: Time,
	sign: Sign,
	seq: u64,		// assigned by the sender, (sender, seq) identifies the event
	origin: Origin,
}

impl Event
{
	/// This is the cheapest way to create an event: the kernel fills in the
	/// sender and sent time when the event is scheduled from a `Context`.
	/// Note that the receiver is not checked until the event is scheduled.
	pub fn new(receiver: AgentID, receive_time: Time) -> Event
	{
		Event{sender: NO_AGENT, receiver, sent_time: Time::NEG_INFINITY, receive_time, sign: Sign::Positive,
			seq: 0, origin: Origin::Local(None)}
	}

	pub fn with_payload<T: Any + Send + Sync>(receiver: AgentID, receive_time: Time, payload: T) -> Event
	{
		let mut event = Event::new(receiver, receive_time);
		event.origin = Origin::Local(Some(Box::new(payload)));
		event
	}

	/// Creates an event with all of its identity filled in.
	pub fn with_sender(receiver: AgentID, receive_time: Time, sender: AgentID, sent_time: Time) -> Event
	{
		assert!(receive_time >= sent_time, "receive time {} is before sent time {}", receive_time, sent_time);
		let mut event = Event::new(receiver, receive_time);
		event.sender = sender;
		event.sent_time = sent_time;
		event
	}

	/// Used by communicators for events that arrived from another process.
	/// Decoding the header is the communicator's job: the frame is simply
	/// kept alive for as long as the event is.
	pub fn from_wire(header: WireHeader, frame: Box<dyn WireFrame>) -> Event
	{
		assert!(header.receive_time >= header.sent_time, "receive time {} is before sent time {}", header.receive_time, header.sent_time);
		Event{sender: header.sender, receiver: header.receiver, sent_time: header.sent_time, receive_time: header.receive_time,
			sign: header.sign, seq: header.seq, origin: Origin::Wire(frame)}
	}

	pub fn sender(&self) -> AgentID
	{
		self.sender
	}

	pub fn receiver(&self) -> AgentID
	{
		self.receiver
	}

	pub fn sent_time(&self) -> Time
	{
		self.sent_time
	}

	pub fn receive_time(&self) -> Time
	{
		self.receive_time
	}

	pub fn sign(&self) -> Sign
	{
		self.sign
	}

	pub fn seq(&self) -> u64
	{
		self.seq
	}

	pub fn is_anti_message(&self) -> bool
	{
		self.sign == Sign::Anti
	}

	pub fn is_remote(&self) -> bool
	{
		match self.origin {
			Origin::Local(_) => false,
			Origin::Wire(_) => true,
		}
	}

	/// Converts this event into an anti-message. Only possible while the
	/// event is still exclusively owned: shared events are cancelled with
	/// `anti_message` instead.
	pub fn make_anti_message(&mut self)
	{
		self.sign = Sign::Anti;
	}

	/// Returns the anti-message that cancels this event. The payload is not
	/// copied: anti-messages are never handed to agents.
	pub fn anti_message(&self) -> Event
	{
		assert!(self.sign == Sign::Positive, "{} is already an anti-message", self);
		let mut event = Event::with_sender(self.receiver, self.receive_time, self.sender, self.sent_time);
		event.seq = self.seq;
		event.make_anti_message();
		event
	}

	/// True if self and other are a positive event and its anti-message.
	pub fn cancels(&self, other: &Event) -> bool
	{
		self.sign != other.sign && self.sender == other.sender && self.seq == other.seq &&
			self.receiver == other.receiver && self.sent_time == other.sent_time && self.receive_time == other.receive_time
	}

	/// Returns the payload if there is one and it is a T.
	pub fn payload<T: Any>(&self) -> Option<&T>
	{
		match self.origin {
			Origin::Local(Some(ref value)) => value.downcast_ref::<T>(),
			_ => None,
		}
	}

	/// Returns a reference to the payload. Panics if there is no payload or it isn't a T.
	pub fn expect_payload<T: Any>(&self, message: &str) -> &T
	{
		match self.origin {
			Origin::Local(Some(ref value)) => {
				if let Some(x) = value.downcast_ref::<T>() {
					x
				} else {
					panic!("event {} {} (downcast failed)", self, message);
				}
			},
			_ => panic!("event {} {} (missing payload)", self, message)
		}
	}

	/// Returns the bytes for events that came in over the wire.
	pub fn frame(&self) -> Option<&[u8]>
	{
		match self.origin {
			Origin::Wire(ref frame) => Some(frame.bytes()),
			Origin::Local(_) => None,
		}
	}

	pub(crate) fn stamp(&mut self, sender: AgentID, sent_time: Time, seq: u64)
	{
		assert!(self.receive_time >= sent_time, "agent {} scheduled an event at {} which is before its time {}", sender, self.receive_time, sent_time);
		self.sender = sender;
		self.sent_time = sent_time;
		self.seq = seq;
	}
}

impl fmt::Display for Event
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		let kind = if self.is_anti_message() {"anti"} else {"event"};
		write!(formatter, "{}[{}#{} -> {}, sent {}, recv {}]", kind, self.sender, self.seq, self.receiver, self.sent_time, self.receive_time)
	}
}

impl fmt::Debug for Event
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		write!(formatter, "{}", self)
	}
}

/// The identity of an event as decoded by a communicator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireHeader
{
	pub sender: AgentID,
	pub receiver: AgentID,
	pub sent_time: Time,
	pub receive_time: Time,
	pub sign: Sign,
	pub seq: u64,
}

/// Shared ownership handle for an `Event`. Every holder (the delivery path,
/// an agent's queue, its processed event history, the sender's sent event
/// history) owns one handle and the event is destroyed when the last
/// handle goes away. Releasing more references than were taken can't be
/// expressed: `decrease_reference` consumes the handle.
#[derive(Clone)]
pub struct EventRef(Arc<Event>);

impl EventRef
{
	/// The new handle is the first reference to the event.
	pub fn new(event: Event) -> EventRef
	{
		EventRef(Arc::new(event))
	}

	/// Returns the reference for a new holder of the event.
	pub fn increase_reference(&self) -> EventRef
	{
		EventRef(Arc::clone(&self.0))
	}

	/// Releases this holder's reference, destroying the event if this was
	/// the last one.
	pub fn decrease_reference(self)
	{
		drop(self);
	}

	pub fn reference_count(&self) -> usize
	{
		Arc::strong_count(&self.0)
	}

	pub fn ptr_eq(&self, other: &EventRef) -> bool
	{
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Deref for EventRef
{
	type Target = Event;

	fn deref(&self) -> &Event
	{
		&self.0
	}
}

impl fmt::Display for EventRef
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		write!(formatter, "{}", *self.0)
	}
}

impl fmt::Debug for EventRef
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		write!(formatter, "{}", *self.0)
	}
}

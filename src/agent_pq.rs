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
use std::cell::Cell;
use std::fmt;
use std::mem;

/// Returned by `AgentPQ::push` and used to update the agent's key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AgentHandle
{
	index: usize,
	agent: AgentID,
}

impl AgentHandle
{
	pub fn agent(&self) -> AgentID
	{
		self.agent
	}
}

struct Node
{
	key: (Time, AgentID),	// agent id breaks ties so that scheduling is reproducible
	parent: Option<usize>,
	children: Vec<usize>,
	slot: usize,		// index within the parent's children
	lost_child: bool,
}

/// Picks the agent with the earliest top time (the receive time of the
/// first event in its queue, INFINITY if it has none). This is a forest of
/// heap ordered trees in the Fibonacci heap family: decreasing a key cuts
/// the node loose and cascades up through parents that have already lost a
/// child, increasing a key promotes the node's children to roots. Unlike a
/// textbook Fibonacci heap roots are consolidated as they are added so there
/// is never more than one root of a given rank and `top` only has to scan
/// O(log n) roots.
///
/// Nodes live in an arena and are addressed by index. Agents are never
/// removed.
pub struct AgentPQ
{
	nodes: Vec<Node>,
	roots: Vec<Option<usize>>,	// indexed by rank
	min: Cell<Option<usize>>,
	dirty: Cell<bool>,
}

impl AgentPQ
{
	pub fn new() -> AgentPQ
	{
		AgentPQ{nodes: Vec::new(), roots: Vec::new(), min: Cell::new(None), dirty: Cell::new(false)}
	}

	pub fn push(&mut self, agent: AgentID, top_time: Time) -> AgentHandle
	{
		let index = self.nodes.len();
		self.nodes.push(Node{key: (top_time, agent), parent: None, children: Vec::new(), slot: 0, lost_child: false});
		self.add_root(index);
		AgentHandle{index, agent}
	}

	/// Returns the agent with the smallest top time. Ties go to the agent
	/// with the smallest id.
	pub fn top(&self) -> Option<AgentID>
	{
		self.top_key().map(|key| key.1)
	}

	pub fn top_key(&self) -> Option<(Time, AgentID)>
	{
		self.min_root().map(|index| self.nodes[index].key)
	}

	/// INFINITY if there are no agents.
	pub fn top_time(&self) -> Time
	{
		self.top_key().map_or(Time::INFINITY, |key| key.0)
	}

	pub fn key(&self, handle: AgentHandle) -> Time
	{
		self.check(handle);
		self.nodes[handle.index].key.0
	}

	/// Call this whenever the agent's top time changes.
	pub fn update(&mut self, handle: AgentHandle, top_time: Time)
	{
		self.check(handle);

		let index = handle.index;
		let old = self.nodes[index].key;
		let new = (top_time, handle.agent);
		if new == old {
			return;
		}
		self.nodes[index].key = new;

		if new < old {
			if let Some(parent) = self.nodes[index].parent {
				if new < self.nodes[parent].key {
					self.cut(index);
				}
			}
		} else if self.nodes[index].parent.is_none() {
			self.remove_root(index);
			self.promote_children(index);
			self.add_root(index);
		} else {
			self.promote_children(index);
			self.cut(index);
		}
		self.dirty.set(true);
	}

	pub fn size(&self) -> usize
	{
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.nodes.is_empty()
	}

	/// Returns the forest as an indented list, roots are prefixed with a star
	/// and nodes that have lost a child with a tick.
	pub fn pretty_print(&self) -> String
	{
		format!("{}", self)
	}

	fn check(&self, handle: AgentHandle)
	{
		assert!(handle.index < self.nodes.len() && self.nodes[handle.index].key.1 == handle.agent, "stale agent handle {:?}", handle);
	}

	fn min_root(&self) -> Option<usize>
	{
		if self.dirty.get() {
			let min = self.roots.iter().filter_map(|&root| root).min_by_key(|&index| self.nodes[index].key);
			self.min.set(min);
			self.dirty.set(false);
		}
		self.min.get()
	}

	// Makes index a root, linking it with the existing root of the same rank
	// until its rank is unique.
	fn add_root(&mut self, index: usize)
	{
		let mut index = index;
		self.nodes[index].parent = None;
		self.nodes[index].lost_child = false;
		loop {
			let rank = self.nodes[index].children.len();
			if rank >= self.roots.len() {
				self.roots.resize(rank + 1, None);
			}
			match self.roots[rank].take() {
				Some(other) => index = self.link(index, other),
				None => {
					self.roots[rank] = Some(index);
					break;
				}
			}
		}
		self.dirty.set(true);
	}

	fn remove_root(&mut self, index: usize)
	{
		let rank = self.nodes[index].children.len();
		assert!(self.roots.get(rank) == Some(&Some(index)), "node {} isn't the root with rank {}", index, rank);
		self.roots[rank] = None;
		self.dirty.set(true);
	}

	// Returns the new root.
	fn link(&mut self, a: usize, b: usize) -> usize
	{
		let (parent, child) = if self.nodes[a].key < self.nodes[b].key {(a, b)} else {(b, a)};
		let slot = self.nodes[parent].children.len();
		self.nodes[parent].children.push(child);
		self.nodes[child].parent = Some(parent);
		self.nodes[child].slot = slot;
		self.nodes[child].lost_child = false;
		parent
	}

	fn detach(&mut self, index: usize)
	{
		let parent = match self.nodes[index].parent.take() {
			Some(parent) => parent,
			None => panic!("node {} has no parent", index),
		};
		let slot = self.nodes[index].slot;
		self.nodes[parent].children.swap_remove(slot);
		if let Some(&moved) = self.nodes[parent].children.get(slot) {
			self.nodes[moved].slot = slot;
		}
	}

	// Moves index to the root list. A non-root parent that loses its second
	// child is cut as well. Root parents change rank so they are re-added.
	fn cut(&mut self, index: usize)
	{
		let parent = match self.nodes[index].parent {
			Some(parent) => parent,
			None => return,
		};

		let parent_is_root = self.nodes[parent].parent.is_none();
		if parent_is_root {
			self.remove_root(parent);
		}
		self.detach(index);
		self.add_root(index);

		if parent_is_root {
			self.add_root(parent);
		} else if self.nodes[parent].lost_child {
			self.cut(parent);
		} else {
			self.nodes[parent].lost_child = true;
		}
	}

	fn promote_children(&mut self, index: usize)
	{
		let children = mem::replace(&mut self.nodes[index].children, Vec::new());
		for child in children {
			self.nodes[child].parent = None;
			self.add_root(child);
		}
	}

	fn fmt_tree(&self, formatter: &mut fmt::Formatter, index: usize, depth: usize) -> fmt::Result
	{
		let node = &self.nodes[index];
		let prefix = if node.parent.is_none() {"*"} else if node.lost_child {"'"} else {""};
		writeln!(formatter, "{:indent$}{}agent {} at {}", "", prefix, node.key.1, node.key.0, indent = depth*3)?;
		for &child in node.children.iter() {
			self.fmt_tree(formatter, child, depth + 1)?;
		}
		Ok(())
	}
}

impl fmt::Display for AgentPQ
{
	fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result
	{
		for &root in self.roots.iter() {
			if let Some(index) = root {
				self.fmt_tree(formatter, index, 0)?;
			}
		}
		Ok(())
	}
}

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
use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A lock which busy-waits instead of suspending the thread. Only
/// worthwhile when the critical section is a handful of instructions,
/// which is the case for splicing events into and out of an agent's
/// queue. Never hold one of these across an agent's processing step.
pub struct SpinLock<T>
{
	locked: AtomicBool,
	value: UnsafeCell<T>,
}

// The lock hands out at most one guard at a time so sharing the lock is
// as safe as sharing a Mutex.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T>
{
	pub fn new(value: T) -> SpinLock<T>
	{
		SpinLock{locked: AtomicBool::new(false), value: UnsafeCell::new(value)}
	}

	pub fn lock(&self) -> SpinLockGuard<T>
	{
		while self.locked.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
			while self.locked.load(Ordering::Relaxed) {
				hint::spin_loop();
			}
		}
		SpinLockGuard{lock: self}
	}
}

pub struct SpinLockGuard<'a, T>
{
	lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T>
{
	type Target = T;

	fn deref(&self) -> &T
	{
		// SAFETY: the guard exists only while the lock is held.
		unsafe { &*self.lock.value.get() }
	}
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T>
{
	fn deref_mut(&mut self) -> &mut T
	{
		// SAFETY: the guard exists only while the lock is held.
		unsafe { &mut *self.lock.value.get() }
	}
}

impl<'a, T> Drop for SpinLockGuard<'a, T>
{
	fn drop(&mut self)
	{
		self.lock.locked.store(false, Ordering::Release);
	}
}

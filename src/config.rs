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
use crate::error::*;
use crate::logging::*;
use crate::sim_time::*;
use rand::{SeedableRng, XorShiftRng};
use std::str::FromStr;
use time::get_time;

/// Used to configure the `Simulation`.
pub struct Config
{
	/// Time at which agents are initialized.
	/// Defaults to 0.
	pub start_time: Time,

	/// Events received at or after this time are discarded.
	/// Defaults to INFINITY.
	pub stop_time: Time,

	/// Number of worker threads. One means the simulation runs on the
	/// calling thread with no contention at all.
	/// Defaults to 1.
	pub num_threads: usize,

	/// Number of processing steps between GVT computations.
	/// Defaults to 64.
	pub gvt_period: usize,

	/// If set then snapshots and event histories that can no longer be
	/// rolled back to are dropped each time GVT advances.
	/// Defaults to true.
	pub collect_garbage: bool,

	/// Random number generator seed.
	/// Defaults to 0 which means seed with entropy. Note that if you want
	/// deterministic results you should use a fixed seed.
	pub seed: u32,

	/// Defaults to Info.
	pub log_level: LogLevel,

	/// Overrides log_level for agents (or the "simulation" and "scheduler"
	/// topics) whose names match the glob. The first match wins.
	/// Defaults to empty.
	pub log_levels: Vec<(glob::Pattern, LogLevel)>,

	/// Use escape sequences to color code stdout.
	/// Defaults to true.
	pub colorize: bool,

	/// Used when logging to stdout when colorize is on.
	/// Defaults to bright red. See See https://en.wikipedia.org/wiki/ANSI_escape_code#Colors
	/// and https://aweirdimagination.net/2015/02/21/256-color-terminals for information on
	/// color escape codes.
	pub error_escape_code: String,

	/// Used when logging to stdout when colorize is on.
	/// Defaults to red.
	pub warning_escape_code: String,

	/// Used when logging to stdout when colorize is on.
	/// Defaults to bold black.
	pub info_escape_code: String,

	/// Used when logging to stdout when colorize is on.
	/// Defaults to black.
	pub debug_escape_code: String,

	/// Used when logging to stdout when colorize is on.
	/// Defaults to light gray.
	pub excessive_escape_code: String,
}

impl Config
{
	pub fn new() -> Config
	{
		Config {
			start_time: Time::ZERO,
			stop_time: Time::INFINITY,
			num_threads: 1,
			gvt_period: 64,
			collect_garbage: true,
			seed: 0,
			log_level: LogLevel::Info,
			log_levels: Vec::new(),
			colorize: true,
			error_escape_code: "\x1b[31;1m".to_string(),
			warning_escape_code: "\x1b[31m".to_string(),
			info_escape_code: "\x1b[30;1m".to_string(),
			debug_escape_code: "".to_string(),
			excessive_escape_code: "\x1b[1;38;5;244m".to_string(),
		}
	}

	pub fn validate(&self) -> Result<(), KernelError>
	{
		if self.stop_time <= self.start_time {
			return Err(KernelError::InvalidOption(format!("stop time ({}) should be after the start time ({})", self.stop_time, self.start_time)));
		}
		if self.num_threads == 0 {
			return Err(KernelError::InvalidOption("num_threads should be positive".to_string()));
		}
		if self.gvt_period == 0 {
			return Err(KernelError::InvalidOption("gvt_period should be positive".to_string()));
		}
		Ok(())
	}

	/// These parse methods return an error message if the value is invalid.
	pub fn parse_log_level(&mut self, level: &str) -> Option<String>
	{
		match parse_level(level) {
			Ok(level) => {self.log_level = level; None},
			Err(message) => Some(message),
		}
	}

	/// Values are formatted as LEVEL:GLOB.
	pub fn parse_log_levels(&mut self, values: Vec<&str>) -> Option<String>
	{
		for value in values {
			let parts: Vec<&str> = value.splitn(2, ':').collect();
			if parts.len() != 2 {
				return Some(format!("--log should be formatted as LEVEL:GLOB, not as '{}'", value));
			}

			let level = match parse_level(parts[0]) {
				Ok(level) => level,
				Err(message) => return Some(message),
			};

			match glob::Pattern::new(parts[1]) {
				Ok(pattern) => self.log_levels.push((pattern, level)),
				Err(err) => return Some(format!("--log glob '{}' is malformed: {}", parts[1], err.msg)),
			}
		}
		None
	}

	pub fn parse_start_time(&mut self, text: &str) -> Option<String>
	{
		match parse_time(text) {
			Ok(time) => {self.start_time = time; None},
			Err(message) => Some(message),
		}
	}

	pub fn parse_stop_time(&mut self, text: &str) -> Option<String>
	{
		match parse_time(text) {
			Ok(time) => {self.stop_time = time; None},
			Err(message) => Some(message),
		}
	}

	/// Accepts a positive number or "auto" for one thread per core.
	pub fn parse_threads(&mut self, text: &str) -> Option<String>
	{
		if text == "auto" {
			self.num_threads = std::thread::available_parallelism().map_or(1, |n| n.get());
			return None;
		}

		match usize::from_str(text) {
			Ok(count) if count > 0 => {self.num_threads = count; None},
			_ => Some(format!("--threads should be a positive number or auto, not '{}'", text)),
		}
	}
}

/// Times are integral ticks. "inf" or "never" can be used for INFINITY.
pub fn parse_time(text: &str) -> Result<Time, String>
{
	match text {
		"inf" | "never" => Ok(Time::INFINITY),
		_ => match i64::from_str(text) {
			Ok(ticks) if ticks > Time::NEG_INFINITY.0 && ticks < Time::INFINITY.0 => Ok(Time(ticks)),
			_ => Err(format!("time '{}' should be a number of ticks or inf", text)),
		}
	}
}

fn parse_level(level: &str) -> Result<LogLevel, String>
{
	match level {
		"error" => Ok(LogLevel::Error),
		"warning" => Ok(LogLevel::Warning),
		"info" => Ok(LogLevel::Info),
		"debug" => Ok(LogLevel::Debug),
		"excessive" => Ok(LogLevel::Excessive),
		_ => Err(format!("log level should be {}, not '{}'", log_levels(), level)),
	}
}

// We care about speed much more than we care about a cryptographic RNG so
// XorShiftRng should be plenty good enough. Models keep these in their State
// so that rolling back also rolls back the random stream.
pub fn new_rng(seed: u32, offset: u32) -> XorShiftRng
{
	let seed = if seed != 0 {seed} else {get_time().nsec as u32};
	let seed = seed.wrapping_add(offset);	// offset is used to give each agent its own random stream
	let seed = if seed != 0 {seed} else {1};	// XorShiftRng panics if seeded with all zeros
	XorShiftRng::from_seed([seed; 4])
}

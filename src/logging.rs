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
#![macro_use]
use crate::config::*;
use crate::sim_time::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd)]
pub enum LogLevel
{
	Error,	// update log_levels if this changes
	Warning,
	Info,
	Debug,
	Excessive
}

/// For use in --help messages.
pub fn log_levels() -> &'static str
{
	"error, warning, info, debug, or excessive"
}

/// Writes log lines to stdout. Shared by every worker thread so it holds
/// no mutable state.
pub struct Logger
{
	log_level: LogLevel,
	log_levels: Vec<(glob::Pattern, LogLevel)>,
	colorize: bool,
	escape_codes: [String; 5],
}

impl Logger
{
	pub fn new(config: &Config) -> Logger
	{
		Logger {
			log_level: config.log_level,
			log_levels: config.log_levels.clone(),
			colorize: config.colorize,
			escape_codes: [
				config.error_escape_code.clone(),
				config.warning_escape_code.clone(),
				config.info_escape_code.clone(),
				config.debug_escape_code.clone(),
				config.excessive_escape_code.clone(),
			],
		}
	}

	/// Topic is normally an agent name, the kernel logs with "simulation"
	/// and "scheduler".
	pub fn should_log(&self, level: LogLevel, topic: &str) -> bool
	{
		if !self.log_levels.is_empty() {	// short circuit some work if we have no overrides
			for &(ref pattern, clevel) in self.log_levels.iter() {
				if pattern.matches(topic) {
					return level <= clevel
				}
			}
		}

		level <= self.log_level
	}

	pub fn log(&self, time: Time, level: LogLevel, topic: &str, message: &str)
	{
		if self.should_log(level, topic) {
			if self.colorize {
				let begin_escape = &self.escape_codes[level as usize];
				print!("{}{}   {} {}{}\n", begin_escape, time, topic, message, end_escape());
			} else {
				let prefix = match level {
					LogLevel::Error		=> "Error",
					LogLevel::Warning	=> "Warn ",
					LogLevel::Info		=> "Info ",
					LogLevel::Debug		=> "Debug",
					LogLevel::Excessive	=> "Exces",
				};
				print!("{}  {} {}  {}\n", time, prefix, topic, message);
			}
		}
	}
}

fn end_escape() -> &'static str
{
	"\x1b[0m"
}

/// Generic macro that calls a log method. More often you'll use one of
/// the other macros like log_info!.
#[macro_export]
macro_rules! log_at
{
	($target:expr, $level:expr) => ($target.log($level, ""));
	($target:expr, $level:expr, $msg:expr) => ($target.log($level, $msg));
	($target:expr, $level:expr, $fmt:expr, $($arg:tt)*) => ($target.log($level, &format!($fmt, $($arg)*)));
}

#[macro_export]
macro_rules! log_error
{
	($target:expr) => ($target.log($crate::LogLevel::Error, ""));
	($target:expr, $msg:expr) => ($target.log($crate::LogLevel::Error, $msg));
	($target:expr, $fmt:expr, $($arg:tt)*) => ($target.log($crate::LogLevel::Error, &format!($fmt, $($arg)*)));
}

#[macro_export]
macro_rules! log_warning
{
	($target:expr) => ($target.log($crate::LogLevel::Warning, ""));
	($target:expr, $msg:expr) => ($target.log($crate::LogLevel::Warning, $msg));
	($target:expr, $fmt:expr, $($arg:tt)*) => ($target.log($crate::LogLevel::Warning, &format!($fmt, $($arg)*)));
}

/// These work with anything that has a `log(LogLevel, &str)` method, e.g.
/// the `Context` handed to agents.
///
/// # Examples
///
/// ```rust,ignore
/// log_info!(ctx);						// logs an empty line
/// log_info!(ctx, "hello");			// logs a string
/// log_info!(ctx, "x = {:?}", x);	// logs using a format string
/// ```
#[macro_export]
macro_rules! log_info
{
	($target:expr) => ($target.log($crate::LogLevel::Info, ""));
	($target:expr, $msg:expr) => ($target.log($crate::LogLevel::Info, $msg));
	($target:expr, $fmt:expr, $($arg:tt)*) => ($target.log($crate::LogLevel::Info, &format!($fmt, $($arg)*)));
}

#[macro_export]
macro_rules! log_debug
{
	($target:expr) => ($target.log($crate::LogLevel::Debug, ""));
	($target:expr, $msg:expr) => ($target.log($crate::LogLevel::Debug, $msg));
	($target:expr, $fmt:expr, $($arg:tt)*) => ($target.log($crate::LogLevel::Debug, &format!($fmt, $($arg)*)));
}

#[macro_export]
macro_rules! log_excessive
{
	($target:expr) => ($target.log($crate::LogLevel::Excessive, ""));
	($target:expr, $msg:expr) => ($target.log($crate::LogLevel::Excessive, $msg));
	($target:expr, $fmt:expr, $($arg:tt)*) => ($target.log($crate::LogLevel::Excessive, &format!($fmt, $($arg)*)));
}

//! PHOLD is the standard benchmark for parallel discrete event simulators.
//! Every agent starts with a few events. Each event an agent processes
//! causes it to send one new event after a random delay, usually to a
//! random agent but sometimes to itself. The number of events in flight
//! therefore stays constant and the interesting numbers are how many events
//! were committed and how much work was thrown away by rollbacks.
#[macro_use]
extern crate clap;
extern crate rand;
#[macro_use]
extern crate timewarp;

use clap::{App, ArgMatches};
use rand::{Rng, XorShiftRng};
use std::fmt::Display;
use std::io::{Write, stderr};
use std::process;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use timewarp::*;

#[derive(Clone)]
struct LocalConfig
{
	num_agents: u32,
	num_events: u32,
	min_delay: i64,
	max_delay: i64,
	remote_percent: u32,
}

impl LocalConfig
{
	fn new() -> LocalConfig
	{
		// These are the defaults: all of them can be overriden using command line options.
		LocalConfig {
			num_agents: 16,
			num_events: 4,
			min_delay: 1,
			max_delay: 10,
			remote_percent: 90,
		}
	}
}

fn fatal_err(message: &str) -> !
{
	let _ = writeln!(&mut stderr(), "{}", message);
	process::exit(1);
}

// Min and max are inclusive.
fn match_num<T>(matches: &ArgMatches, name: &str, min: T, max: T) -> T
		where T: Copy + Display + FromStr + PartialOrd
{
	match value_t!(matches.value_of(name), T) {
		Ok(value) if value < min => fatal_err(&format!("--{} should be greater than {}", name, min)),
		Ok(value) if value > max => fatal_err(&format!("--{} should be less than {}", name, max)),
		Ok(value) => value,
		_ => fatal_err(&format!("--{} should be a number", name)),
	}
}

// Everything execute_task changes has to be in here so that it's rolled back.
#[derive(Clone)]
struct PholdState
{
	rng: XorShiftRng,
	committed: u64,
}

struct PholdAgent
{
	local: LocalConfig,
	totals: Arc<Mutex<Vec<u64>>>,
}

impl PholdAgent
{
	fn send(&self, state: &mut PholdState, ctx: &mut Context)
	{
		let to = if state.rng.gen_range(0, 100) < self.local.remote_percent {
			AgentID(state.rng.gen_range(0, self.local.num_agents))
		} else {
			ctx.id()
		};
		let delay = state.rng.gen_range(self.local.min_delay, self.local.max_delay + 1);
		ctx.schedule_after(to, delay, state.committed);
	}
}

impl Agent for PholdAgent
{
	type State = PholdState;

	fn initialize(&mut self, state: &mut PholdState, ctx: &mut Context) -> InitResult
	{
		for _ in 0..self.local.num_events {
			self.send(state, ctx);
		}
		Ok(())
	}

	fn execute_task(&self, state: &mut PholdState, events: &[EventRef], ctx: &mut Context)
	{
		log_excessive!(ctx, "processing {} events", events.len());
		for _ in events {
			state.committed += 1;
			self.send(state, ctx);
		}
	}

	fn finalize(&mut self, state: &PholdState, ctx: &mut Context)
	{
		log_debug!(ctx, "committed {} events", state.committed);
		if let Ok(mut totals) = self.totals.lock() {
			totals[ctx.id().0 as usize] = state.committed;
		}
	}
}

fn parse_options() -> (LocalConfig, Config)
{
	let mut local = LocalConfig::new();
	let mut config = Config::new();
	config.stop_time = Time(1_000);

	// see https://docs.rs/clap/2.24.2/clap/struct.Arg.html#method.from_usage for syntax
	let usage = format!(
		"--agents=[N] 'Number of agents [{default_agents}]'
		--events=[N] 'Number of events each agent starts with [{default_events}]'
		--gvt-period=[N] 'Number of steps between GVT computations [{default_period}]'
		--log=[LEVEL:GLOB]... 'Overrides --log-level, glob is used to match agent names'
		--log-level=[LEVEL] 'Default log level: {log_levels} [{default_level}]'
		--max-delay=[TICKS] 'Largest delay between receiving and sending an event [{default_max}]'
		--min-delay=[TICKS] 'Smallest delay between receiving and sending an event [{default_min}]'
		--no-colors 'Don't color code console output'
		--no-gc 'Keep every snapshot and event until the simulation ends'
		--remote=[PERCENT] 'Percentage of events sent to a random agent instead of the sender [{default_remote}]'
		--seed=[N] 'Random number generator seed [random]'
		--stop-time=[TIME] 'Events at or after this time are discarded, use inf for no limit [{default_stop}]'
		--threads=[N] 'Number of worker threads or auto [{default_threads}]'",
		default_agents = local.num_agents,
		default_events = local.num_events,
		default_period = config.gvt_period,
		default_level = format!("{:?}", config.log_level).to_lowercase(),
		default_max = local.max_delay,
		default_min = local.min_delay,
		default_remote = local.remote_percent,
		default_stop = config.stop_time,
		default_threads = config.num_threads,
		log_levels = log_levels());

	let matches = App::new("phold")
		.version("1.0")
		.author("Jesse Jones <jesse9jones@gmail.com>")
		.about("Runs the PHOLD benchmark.")
		.args_from_usage(&usage)
	.get_matches();

	if matches.is_present("agents") {
		local.num_agents = match_num(&matches, "agents", 1, 1_000_000);
	}

	if matches.is_present("events") {
		local.num_events = match_num(&matches, "events", 1, 1_000);
	}

	if matches.is_present("min-delay") {
		local.min_delay = match_num(&matches, "min-delay", 1, 1_000_000);
	}

	if matches.is_present("max-delay") {
		local.max_delay = match_num(&matches, "max-delay", 1, 1_000_000);
	}

	if local.min_delay > local.max_delay {
		fatal_err("--min-delay should not be larger than --max-delay");
	}

	if matches.is_present("remote") {
		local.remote_percent = match_num(&matches, "remote", 0, 100);
	}

	if matches.is_present("gvt-period") {
		config.gvt_period = match_num(&matches, "gvt-period", 1, 1_000_000);
	}

	if matches.is_present("seed") {
		config.seed = match_num(&matches, "seed", 1, u32::max_value());
	}

	if let Some(value) = matches.value_of("threads") {
		if let Some(e) = config.parse_threads(value) {
			fatal_err(&e);
		}
	}

	if let Some(value) = matches.value_of("stop-time") {
		if let Some(e) = config.parse_stop_time(value) {
			fatal_err(&e);
		}
	}

	if let Some(value) = matches.value_of("log-level") {
		if let Some(e) = config.parse_log_level(value) {
			fatal_err(&e);
		}
	}

	if let Some(values) = matches.values_of("log") {
		if let Some(e) = config.parse_log_levels(values.collect()) {
			fatal_err(&e);
		}
	}

	config.colorize = !matches.is_present("no-colors");
	config.collect_garbage = !matches.is_present("no-gc");

	if let Err(e) = config.validate() {
		fatal_err(&e.to_string());
	}

	(local, config)
}

fn create_sim(local: LocalConfig, config: Config, totals: &Arc<Mutex<Vec<u64>>>) -> Simulation
{
	let seed = config.seed;
	let mut sim = Simulation::new(config);
	for i in 0..local.num_agents {
		let agent = PholdAgent{local: local.clone(), totals: totals.clone()};
		let state = PholdState{rng: new_rng(seed, i), committed: 0};
		if let Err(e) = sim.try_register_agent(AgentID(i), &format!("phold-{}", i), agent, state) {
			fatal_err(&e.to_string());
		}
	}
	sim
}

fn main()
{
	let (local, config) = parse_options();
	let totals = Arc::new(Mutex::new(vec![0; local.num_agents as usize]));

	let mut sim = create_sim(local, config, &totals);
	let failures = sim.run();
	for failure in failures.iter() {
		let _ = writeln!(&mut stderr(), "{}", failure);
	}

	let stats = sim.stats();
	let committed: u64 = totals.lock().map(|t| t.iter().sum()).unwrap_or(0);
	println!("committed {} events in {:.3}s ({:.0} events/sec)", committed, stats.elapsed_secs,
		(committed as f64)/stats.elapsed_secs.max(1.0e-9));
	println!("{}", stats);
}

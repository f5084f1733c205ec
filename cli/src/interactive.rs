use std::{
    collections::BTreeMap,
    fmt,
    io::{stdin, stdout, Write},
};

use anyhow::Result;
use bitmask_enum::bitmask;
use cache_sim::{
    cache::{AccessKind, AccessOutcome},
    sim::Simulator,
    stat::{SlotDump, Stat},
    trace::{TraceError, TraceOp, TraceRecord},
};

use crate::get_terminal_width;

peg::parser!(grammar command() for str {
    rule usize() -> usize
        = n:$(quiet!{['0'..='9']+}) {? n.parse().or(Err("usize")) }
        / expected!("usize")
    rule address() -> String
        = a:$(quiet!{[^ ' ' | '\t' | '\r' | '\n']+}) { a.to_owned() }
        / expected!("address")
    rule read() = "read" / "r"
    rule write() = "write" / "w"
    rule watch_kind() -> WatchKind
        = read() { WatchKind::Read }
        / write() { WatchKind::Write }
    rule show_kind() -> ShowKind
        = "stat" { ShowKind::Stat }
        / "dump" { ShowKind::Dump }
        / "slot" __ i:usize() { ShowKind::Slot(i) }
        / "decode" __ a:address() { ShowKind::Decode(a) }
        / "watch" { ShowKind::Watchings }
        / "help" { ShowKind::Help }
    pub(crate) rule parse_command() -> Command
        = _ read() __ a:address() _ { Command::Access(TraceOp::Read, a) }
        / _ write() __ a:address() _ { Command::Access(TraceOp::Write, a) }
        / _ "step" n:(__ n:usize() { n })? _ { Command::Step(n.unwrap_or(1)) }
        / _ "run" _ { Command::Run }
        / _ "watch" __ i:usize() k:(__ k:watch_kind() { k })? _ {
            Command::Watch(Operation::Add, i, k.unwrap_or(WatchKind::all()))
        }
        / _ "unwatch" __ i:usize() _ { Command::Watch(Operation::Remove, i, WatchKind::all()) }
        / _ s:show_kind() _ { Command::Show(s) }
        / _ ("exit" / "quit" / "q") _ { Command::Exit }
        / _ { Command::Nop }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Access(TraceOp, String),
    Step(usize),
    Run,
    Watch(Operation, usize, WatchKind),
    Show(ShowKind),
    Exit,
    Nop,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Operation {
    Add,
    Remove,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ShowKind {
    Stat,
    Dump,
    Slot(usize),
    Decode(String),
    Watchings,
    Help,
}

#[bitmask(u8)]
pub(crate) enum WatchKind {
    Read,
    Write,
}

impl WatchKind {
    fn matches(self, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Read => self.contains(WatchKind::Read),
            AccessKind::Write => self.contains(WatchKind::Write),
        }
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::Read) {
            write!(f, "read")?;
            if self.contains(Self::Write) {
                write!(f, "/write")?;
            }
        } else if self.contains(Self::Write) {
            write!(f, "write")?;
        }
        Ok(())
    }
}

const HELP: &str = "\
commands:
  r | read <addr>           read access
  w | write <addr>          write access
  step [n]                  apply the next n trace records (default 1)
  run                       apply the rest of the trace
  stat                      show statistics
  dump                      show valid lines
  slot <index>              show one line
  decode <addr>             show tag, index and offset of an address
  watch [<index> [r|w]]     report accesses to a line / list watched lines
  unwatch <index>           stop watching a line
  exit | quit | q           leave";

#[derive(Default)]
struct Watchings {
    lines: BTreeMap<usize, WatchKind>,
}

impl Watchings {
    /// watched line touched by `outcome`, if any.
    fn hit_by(&self, outcome: &AccessOutcome) -> Option<usize> {
        let index = outcome.decoded.index_value();
        let kind = self.lines.get(&index)?;
        kind.matches(outcome.kind).then_some(index)
    }
    fn notify(&self, outcome: &AccessOutcome) {
        if let Some(index) = self.hit_by(outcome) {
            println!("watched line {index}: {outcome}");
        }
    }
}

enum TraceState {
    Pending,
    Finished,
    Stopped(String),
}

pub fn execute_interactive<I>(sim: &mut Simulator, records: &mut I) -> Result<()>
where
    I: Iterator<Item = Result<TraceRecord, TraceError>>,
{
    let width = get_terminal_width().unwrap_or(60) as usize;
    let mut watchings = Watchings::default();
    let mut trace = TraceState::Pending;
    println!("entering interactive. type `help` for commands.");
    loop {
        print!("[{}] > ", sim.processed());
        stdout().flush()?;
        let mut str = String::new();
        if stdin().read_line(&mut str)? == 0 {
            println!();
            break;
        }
        let parsed = match command::parse_command(&str) {
            Ok(p) => p,
            Err(e) => {
                println!("parse error: expected {}", e.expected);
                continue;
            }
        };
        match parsed {
            Command::Access(op, addr) => match sim.access(op, &addr) {
                Ok(outcome) => {
                    println!("{outcome}");
                    watchings.notify(&outcome);
                }
                Err(e) => println!("{e}"),
            },
            Command::Step(n) => step(sim, records, &mut trace, &watchings, Some(n)),
            Command::Run => step(sim, records, &mut trace, &watchings, None),
            Command::Watch(Operation::Add, index, kind) => {
                if index >= sim.cache().num_lines() {
                    println!("line {index} does not exist");
                    continue;
                }
                *watchings.lines.entry(index).or_insert(WatchKind::none()) |= kind;
                show_watchings(&watchings);
            }
            Command::Watch(Operation::Remove, index, _) => {
                watchings.lines.remove(&index);
                show_watchings(&watchings);
            }
            Command::Show(ShowKind::Stat) => {
                println!("{}", sim.collect_stat().view(width));
            }
            Command::Show(ShowKind::Dump) => {
                print!("{}", SlotDump::of(sim.cache()).view(width));
            }
            Command::Show(ShowKind::Slot(index)) => match sim.cache().slot(index) {
                Some(slot) => match slot.tag() {
                    Some(tag) => {
                        let base = sim.cache().config().layout().block_address(tag, index);
                        print!("line {index}: valid, tag {tag}, block {base:#010x}");
                        #[cfg(feature = "dirty_tracking")]
                        if slot.is_dirty() {
                            print!(", dirty");
                        }
                        println!();
                    }
                    None => println!("line {index}: invalid"),
                },
                None => println!("line {index} does not exist"),
            },
            Command::Show(ShowKind::Decode(addr)) => {
                println!("{}", sim.cache().config().layout().decode(&addr));
            }
            Command::Show(ShowKind::Watchings) => show_watchings(&watchings),
            Command::Show(ShowKind::Help) => println!("{HELP}"),
            Command::Exit => break,
            Command::Nop => (),
        }
    }
    println!("exiting interactive.");
    Ok(())
}

/// applies up to `limit` records, echoing each one when stepping.
fn step<I>(
    sim: &mut Simulator,
    records: &mut I,
    trace: &mut TraceState,
    watchings: &Watchings,
    limit: Option<usize>,
) where
    I: Iterator<Item = Result<TraceRecord, TraceError>>,
{
    match trace {
        TraceState::Pending => (),
        TraceState::Finished => {
            println!("end of trace");
            return;
        }
        TraceState::Stopped(why) => {
            println!("trace stopped: {why}");
            return;
        }
    }
    let echo = limit.is_some();
    let mut applied = 0;
    while limit.map_or(true, |l| applied < l) {
        let record = match records.next() {
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                println!("{e}");
                *trace = TraceState::Stopped(e.to_string());
                break;
            }
            None => {
                println!("end of trace");
                *trace = TraceState::Finished;
                break;
            }
        };
        match sim.apply(&record) {
            Ok(outcome) => {
                if echo {
                    println!("{record}: {outcome}");
                }
                watchings.notify(&outcome);
            }
            Err(e) => {
                println!("{e}");
                *trace = TraceState::Stopped(e.to_string());
                break;
            }
        }
        applied += 1;
    }
    if !echo {
        println!("{applied} records applied");
    }
}

fn show_watchings(watchings: &Watchings) {
    if watchings.lines.is_empty() {
        println!("nothing to watch.");
        return;
    }
    println!("watching these lines:");
    for (index, kind) in &watchings.lines {
        println!("\t{index} ({kind})");
    }
}

//! Line-oriented debugger front end for terminals.

use crate::checker::Verdict;
use crate::debugger::{DebugEvent, DebugSession, FrameView, Variable};
use crate::error::ProtocolError;
use std::io::{self, BufRead, Write};
use tracing::debug;

const HELP: &str = "\
commands:
  c                       continue
  s [n]                   step into n frames (default 1)
  n                       step over
  o                       step out
  bt                      print the stack
  vars [frame]            variables of a frame (default: innermost)
  expand <handle>         elements of an aggregate
  break <module> <line>.. add breakpoints
  clear                   remove all breakpoints
  q                       disconnect and quit";

enum Outcome {
    Resumed,
    Stay,
    Quit,
}

/// Launches the session and serves commands from `input` until the
/// evaluation terminates or the user quits. End of input disconnects.
pub fn run_console<R: BufRead, W: Write>(
    session: &mut DebugSession,
    input: R,
    output: &mut W,
) -> io::Result<Option<Verdict>> {
    session
        .launch()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let mut lines = input.lines();

    loop {
        match session.wait_event() {
            Some(DebugEvent::Stopped { reason, frames }) => {
                if let Some(top) = frames.first() {
                    writeln!(
                        output,
                        "stopped ({}) in {} at {} [depth {}]",
                        reason.as_str(),
                        top.name,
                        top.location,
                        frames.len()
                    )?;
                }
            }
            Some(DebugEvent::Terminated { verdict }) => {
                writeln!(output, "terminated: {}", verdict)?;
                return Ok(Some(verdict));
            }
            None => return Ok(session.verdict().cloned()),
        }

        loop {
            write!(output, "(tla) ")?;
            output.flush()?;
            let Some(line) = lines.next().transpose()? else {
                let verdict = session.disconnect(None);
                writeln!(output)?;
                return Ok(verdict);
            };
            match command(session, &line, output)? {
                Outcome::Resumed => break,
                Outcome::Stay => continue,
                Outcome::Quit => return Ok(session.disconnect(None)),
            }
        }
    }
}

fn command<W: Write>(session: &mut DebugSession, line: &str, output: &mut W) -> io::Result<Outcome> {
    let Some(words) = shlex::split(line) else {
        writeln!(output, "unbalanced quotes")?;
        return Ok(Outcome::Stay);
    };
    let Some((verb, args)) = words.split_first() else {
        return Ok(Outcome::Stay);
    };
    debug!(%verb, ?args, "console command");

    let result: Result<Outcome, ProtocolError> = match verb.as_str() {
        "c" | "continue" => session.continue_().map(|()| Outcome::Resumed),
        "s" | "step" => number(args.first()).and_then(|count| {
            let count = u32::try_from(count.unwrap_or(1))
                .map_err(|_| ProtocolError::InvalidArguments("step count is too large".to_string()))?;
            session.step_in(count)?;
            Ok(Outcome::Resumed)
        }),
        "n" | "next" => session.step_over().map(|()| Outcome::Resumed),
        "o" | "out" => session.step_out().map(|()| Outcome::Resumed),
        "bt" | "backtrace" => session.stack_trace().and_then(|frames| {
            print_frames(output, &frames).map_err(io_to_protocol)?;
            Ok(Outcome::Stay)
        }),
        "vars" => variables(session, args.first(), output),
        "expand" => match number(args.first()) {
            Ok(Some(handle)) => session.expand(handle).and_then(|vars| {
                print_variables(output, &vars).map_err(io_to_protocol)?;
                Ok(Outcome::Stay)
            }),
            Ok(None) => Err(ProtocolError::InvalidArguments("expand needs a handle".to_string())),
            Err(e) => Err(e),
        },
        "break" | "b" => add_breakpoints(session, args),
        "clear" => {
            session.unset_breakpoints();
            Ok(Outcome::Stay)
        }
        "q" | "quit" => Ok(Outcome::Quit),
        "h" | "help" => {
            writeln!(output, "{}", HELP)?;
            Ok(Outcome::Stay)
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    };

    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            writeln!(output, "error: {}", err)?;
            Ok(Outcome::Stay)
        }
    }
}

fn variables<W: Write>(
    session: &mut DebugSession,
    frame: Option<&String>,
    output: &mut W,
) -> Result<Outcome, ProtocolError> {
    let frame_id = match number(frame)? {
        Some(id) => id,
        None => session
            .stack_trace()?
            .first()
            .map(|f| f.id)
            .ok_or(ProtocolError::NotPaused)?,
    };
    let vars = session.variables(frame_id)?;
    print_variables(output, &vars).map_err(io_to_protocol)?;
    Ok(Outcome::Stay)
}

fn add_breakpoints(session: &DebugSession, args: &[String]) -> Result<Outcome, ProtocolError> {
    let Some((module, lines)) = args.split_first() else {
        return Err(ProtocolError::InvalidArguments(
            "usage: break <module> <line>...".to_string(),
        ));
    };
    for line in lines {
        let line = line
            .parse::<u32>()
            .map_err(|_| ProtocolError::InvalidArguments(format!("`{}` is not a line number", line)))?;
        session.add_breakpoint(module, line)?;
    }
    Ok(Outcome::Stay)
}

fn number(word: Option<&String>) -> Result<Option<u64>, ProtocolError> {
    word.map(|w| {
        w.parse::<u64>()
            .map_err(|_| ProtocolError::InvalidArguments(format!("`{}` is not a number", w)))
    })
    .transpose()
}

fn io_to_protocol(err: io::Error) -> ProtocolError {
    ProtocolError::InvalidArguments(err.to_string())
}

fn print_frames<W: Write>(output: &mut W, frames: &[FrameView]) -> io::Result<()> {
    for frame in frames {
        writeln!(
            output,
            "  #{} {} ({:?}) {}:{}:{}",
            frame.id, frame.name, frame.kind, frame.module, frame.begin_line, frame.begin_column
        )?;
    }
    Ok(())
}

fn print_variables<W: Write>(output: &mut W, vars: &[Variable]) -> io::Result<()> {
    for var in vars {
        match var.handle {
            Some(handle) => writeln!(output, "  {} = {} : {} [{}]", var.name, var.value, var.type_tag, handle)?,
            None => writeln!(output, "  {} = {} : {}", var.name, var.value, var.type_tag)?,
        }
    }
    Ok(())
}

//! Reference worker for both wire protocols.
//!
//! Reads request frames on stdin and answers each with exactly one reply on
//! stdout. Used by the integration tests and as a starting point for real
//! workers.
//!
//! Usage:
//!   rowpipe-echo text echo            # reply with the request rows
//!   rowpipe-echo text hello           # prefix every row with a "Hello" cell
//!   rowpipe-echo text summarize       # reply 0 rows, then the total line count at the end
//!   rowpipe-echo binary echo          # reply with the request payload
//!   rowpipe-echo binary empty         # reply a zero-column payload every round
//!   rowpipe-echo binary drop-column   # reply without the last column
//!   rowpipe-echo <format> die-after N # echo N requests, then exit without replying
//!   rowpipe-echo <format> garbage     # reply with an unreadable header

use rowpipe::wire::frame::{empty_payload, parse_payload, write_payload, LENGTH_PREFIX_BYTES};
use rowpipe::ExchangeError;
use std::sync::Arc;
use std::env;
use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

/// Bytes written before the first flush in `hello` mode.
const FIRST_PACKET_BYTES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Echo,
    Hello,
    Summarize,
    Empty,
    DropColumn,
    DieAfter(usize),
    Garbage,
}

fn parse_mode(name: &str, count: Option<&str>) -> Result<Mode, String> {
    match name {
        "echo" => Ok(Mode::Echo),
        "hello" => Ok(Mode::Hello),
        "summarize" => Ok(Mode::Summarize),
        "empty" => Ok(Mode::Empty),
        "drop-column" => Ok(Mode::DropColumn),
        "garbage" => Ok(Mode::Garbage),
        "die-after" => count
            .ok_or_else(|| "die-after needs a request count".to_string())?
            .parse()
            .map(Mode::DieAfter)
            .map_err(|e| format!("invalid request count: {}", e)),
        other => Err(format!("unknown mode: {}", other)),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: rowpipe-echo <text|binary> <mode> [n]");
        return ExitCode::FAILURE;
    }
    let mode = match parse_mode(&args[1], args.get(2).map(String::as_str)) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("rowpipe-echo: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = match args[0].as_str() {
        "text" => run_text(mode, stdin.lock(), stdout.lock()),
        "binary" => run_binary(mode, stdin.lock(), stdout.lock()),
        other => {
            eprintln!("rowpipe-echo: unknown format: {}", other);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rowpipe-echo: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_text(mode: Mode, mut input: impl BufRead, mut output: impl Write) -> io::Result<()> {
    let mut requests = 0usize;
    let mut total_lines = 0usize;

    loop {
        let mut header = String::new();
        if input.read_line(&mut header)? == 0 {
            return Ok(());
        }
        let count: usize = header
            .trim_end_matches('\n')
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad header: {}", e)))?;

        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            lines.push(line);
        }

        if count == 0 {
            match mode {
                Mode::Summarize => writeln!(output, "1\n{}", total_lines)?,
                _ => output.write_all(b"0\n")?,
            }
            output.flush()?;
            return Ok(());
        }

        requests += 1;
        total_lines += count;
        match mode {
            Mode::DieAfter(n) if requests > n => return Ok(()),
            Mode::Garbage => output.write_all(b"not-a-count\n")?,
            Mode::Summarize => output.write_all(b"0\n")?,
            Mode::Hello => {
                let mut reply = format!("{}\n", count);
                for line in &lines {
                    reply.push_str("Hello\t");
                    reply.push_str(line);
                }
                let split = FIRST_PACKET_BYTES.min(reply.len());
                output.write_all(&reply.as_bytes()[..split])?;
                output.flush()?;
                thread::sleep(Duration::from_millis(5));
                output.write_all(&reply.as_bytes()[split..])?;
            }
            _ => {
                writeln!(output, "{}", count)?;
                for line in &lines {
                    output.write_all(line.as_bytes())?;
                }
            }
        }
        output.flush()?;
    }
}

fn run_binary(mode: Mode, mut input: impl Read, mut output: impl Write) -> io::Result<()> {
    let mut requests = 0usize;

    loop {
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        match input.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let size = u64::from_le_bytes(prefix) as usize;
        if size == 0 {
            output.write_all(&0u64.to_le_bytes())?;
            output.flush()?;
            return Ok(());
        }
        let mut payload = vec![0u8; size];
        input.read_exact(&mut payload)?;
        requests += 1;

        let reply = match mode {
            Mode::DieAfter(n) if requests > n => return Ok(()),
            Mode::Garbage => b"junk!".to_vec(),
            Mode::Empty => empty_payload().map_err(invalid)?,
            Mode::DropColumn => drop_last_column(&payload)?,
            _ => payload,
        };
        output.write_all(&(reply.len() as u64).to_le_bytes())?;
        output.write_all(&reply)?;
        output.flush()?;
    }
}

fn invalid(e: ExchangeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn drop_last_column(payload: &[u8]) -> io::Result<Vec<u8>> {
    let parsed = parse_payload(payload).map_err(invalid)?;
    let keep: Vec<usize> = (0..parsed.num_columns().saturating_sub(1)).collect();
    let other = |e: arrow::error::ArrowError| io::Error::new(io::ErrorKind::InvalidData, e);
    let schema = Arc::new(parsed.schema.project(&keep).map_err(other)?);
    let batches = parsed
        .batches
        .iter()
        .map(|b| b.project(&keep))
        .collect::<Result<Vec<_>, _>>()
        .map_err(other)?;
    write_payload(&schema, &batches).map_err(invalid)
}

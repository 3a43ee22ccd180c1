//! the request trace loader
//!
//! one request per line, `R <addr>` or `W <addr>`, addresses in hex with a
//! `0x` prefix or plain decimal, `#` starts a comment.

use std::path::Path;

use eyre::{bail, Result, WrapErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRequest {
    pub write: bool,
    pub addr: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub requests: Vec<TraceRequest>,
}

pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read trace file {:?}", path))?;
    parse_trace(&text).wrap_err_with(|| format!("cannot parse trace file {:?}", path))
}

pub fn parse_trace(text: &str) -> Result<Trace> {
    let mut requests = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let write = match parts.next() {
            Some("R") => false,
            Some("W") => true,
            Some(other) => bail!("line {}: unknown operation {:?}", line_no + 1, other),
            None => continue,
        };
        let Some(token) = parts.next() else {
            bail!("line {}: missing address", line_no + 1);
        };
        let addr = match token.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => token.parse(),
        }
        .wrap_err_with(|| format!("line {}: bad address {:?}", line_no + 1, token))?;
        requests.push(TraceRequest { write, addr });
    }
    Ok(Trace { requests })
}

//! Plugin output parsing and return code interpretation.

use crate::checks::CheckResult;
use crate::objects::{EntityKind, State};

pub const TIMEOUT_OUTPUT: &str = "(Process Timeout)";
pub const NO_OUTPUT: &str = "(No output returned from plugin)";

/// Plugin output split into its three parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub short: String,
    pub long: String,
    pub perf_data: String,
}

/// Splits raw plugin output.
///
/// The first line holds the short output and, after a `|`, performance
/// data. Following lines are long output until one contains a `|`; the text
/// after it and every line below is more performance data.
pub fn parse_output(raw: &str) -> ParsedOutput {
    let mut lines = raw.lines();
    let mut parsed = ParsedOutput::default();
    let mut perf = Vec::new();

    if let Some(first) = lines.next() {
        match first.split_once('|') {
            Some((short, data)) => {
                parsed.short = short.trim().to_string();
                perf.push(data.trim().to_string());
            }
            None => parsed.short = first.trim().to_string(),
        }
    }

    let mut long = Vec::new();
    let mut in_perf = false;
    for line in lines {
        if in_perf {
            perf.push(line.trim().to_string());
            continue;
        }
        match line.split_once('|') {
            Some((text, data)) => {
                long.push(text.trim_end().to_string());
                perf.push(data.trim().to_string());
                in_perf = true;
            }
            None => long.push(line.trim_end().to_string()),
        }
    }

    while long.last().is_some_and(|line| line.is_empty()) {
        long.pop();
    }
    parsed.long = long.join("\n");
    parsed.perf_data = perf.into_iter().filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ");
    parsed
}

/// State and output an entity ends up with after a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub state: State,
    pub output: ParsedOutput,
}

/// Maps a raw result to a state.
///
/// Timeouts, unclean exits and out-of-bounds return codes produce a fixed
/// problem state and a synthetic output; everything else is parsed.
pub fn interpret(kind: EntityKind, result: &CheckResult, service_timeout_state: State) -> Interpretation {
    let failure_state = match kind {
        EntityKind::Host => State::Down,
        EntityKind::Service => State::Unknown,
    };
    let label = match kind {
        EntityKind::Host => "Host",
        EntityKind::Service => "Service",
    };
    let synthetic = |state: State, short: String| Interpretation {
        state,
        output: ParsedOutput { short, ..ParsedOutput::default() },
    };

    if result.early_timeout {
        let state = match kind {
            EntityKind::Host => State::Down,
            EntityKind::Service => service_timeout_state,
        };
        return synthetic(state, TIMEOUT_OUTPUT.to_string());
    }
    if !result.exited_ok {
        return synthetic(failure_state, format!("({label} check did not exit properly)"));
    }
    let Some(state) = State::from_code(kind, result.return_code) else {
        let hint = match result.return_code {
            126 => " - plugin may not be executable",
            127 => " - plugin may be missing",
            _ => "",
        };
        return synthetic(
            failure_state,
            format!("(Return code of {} is out of bounds{})", result.return_code, hint),
        );
    };

    let mut output = parse_output(&result.output);
    if output.short.is_empty() {
        output.short = NO_OUTPUT.to_string();
    } else {
        output.short = output.short.replace(';', ":");
    }
    Interpretation { state, output }
}

//! Exception and stack trace rendering.
//!
//! Pure functions over [`ExceptionPayload`] and [`StackTracePayload`] that
//! produce the conventional "most recent call last" traceback text.

use std::fmt::Write;

use crate::exception_schema::{ExceptionPayload, StackFrame, StackTracePayload};

/// Format a stack trace payload into a human-readable string.
pub fn format_stack_payload(payload: &StackTracePayload) -> String {
    let mut output = String::from("Stack (most recent call last):\n");
    for frame in &payload.frames {
        output.push_str(&format_stack_frame(frame));
    }
    output
}

/// Format an exception payload, including its cause or context chain.
///
/// Chained errors are rendered first, oldest at the top. The chain is walked
/// iteratively so long cause chains cannot exhaust the stack.
pub fn format_exception_payload(payload: &ExceptionPayload) -> String {
    let mut chain: Vec<(&ExceptionPayload, Option<&'static str>)> = vec![(payload, None)];
    let mut current = payload;
    loop {
        let next = if let Some(cause) = current.cause.as_deref() {
            Some((cause, CAUSE_SEPARATOR))
        } else if let Some(context) = current.context.as_deref()
            && !current.suppress_context
        {
            Some((context, CONTEXT_SEPARATOR))
        } else {
            None
        };
        let Some((link, separator)) = next else {
            break;
        };
        chain.push((link, Some(separator)));
        current = link;
    }

    let mut output = String::new();
    // `chain` runs newest to oldest; the separator on each older entry
    // belongs between it and the newer exception that follows.
    for (entry, separator) in chain.iter().rev() {
        output.push_str(&format_exception_body(entry));
        if let Some(separator) = separator {
            output.push_str(separator);
        }
    }
    output
}

const CAUSE_SEPARATOR: &str =
    "\nThe above exception was the direct cause of the following exception:\n\n";
const CONTEXT_SEPARATOR: &str =
    "\nDuring handling of the above exception, another exception occurred:\n\n";

fn format_exception_body(payload: &ExceptionPayload) -> String {
    let mut output = String::from("Traceback (most recent call last):\n");
    for frame in &payload.frames {
        output.push_str(&format_stack_frame(frame));
    }
    match payload.module {
        Some(ref module) => {
            let _ = writeln!(output, "{}.{}: {}", module, payload.type_name, payload.message);
        }
        None => {
            let _ = writeln!(output, "{}: {}", payload.type_name, payload.message);
        }
    }
    for note in &payload.notes {
        let _ = writeln!(output, "  {note}");
    }
    output
}

/// Format a single stack frame.
pub fn format_stack_frame(frame: &StackFrame) -> String {
    let mut output = format!(
        "  File \"{}\", line {}, in {}\n",
        frame.filename, frame.lineno, frame.function
    );
    if let Some(source) = frame.source_line.as_deref().map(str::trim)
        && !source.is_empty()
    {
        let _ = writeln!(output, "    {source}");
    }
    output
}

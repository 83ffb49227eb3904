//! # Fault Boundary
//!
//! Contains panics raised by handler code so that one misbehaving handler
//! fails exactly one call instead of the session or the process.
//!
//! A [`Boundary`] polls the wrapped future inside `catch_unwind`. While a
//! boundary is polling, a process-wide panic hook (installed once, and
//! delegating to the previously installed hook everywhere else) captures a
//! backtrace of the panicking frames. Frames that belong to the panic machinery,
//! the dispatch adapters or the boundary itself are trimmed from the report.
//!
//! The hook is installed the first time [`catch`] runs, which is the first
//! dispatched request. An application that installs its own hook afterwards
//! replaces it, and handler panics are then still contained but reported
//! without a backtrace.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::cell::RefCell;
use std::future::Future;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Once;
use std::task::Context;
use std::task::Poll;

/// Symbols of the frames that lead into the panic hook.
const PANIC_MACHINERY: &[&str] = &[
    "rust_begin_unwind",
    "core::panicking::",
    "std::panicking::begin_panic",
    "std::panicking::rust_panic_with_hook",
    "std::panicking::default_hook",
    "std::backtrace",
    "std::rt::begin_panic",
    "duorpc::fault::install_hook",
];

/// Symbol prefixes of the dispatch frames between the handler and the boundary.
const BOUNDARY: &[&str] = &["duorpc::fault::", "duorpc::route::", "duorpc::handler::"];

static HOOK: Once = Once::new();

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A contained panic.
#[derive(Debug, Clone)]
pub struct Fault {
    /// The panic message, or a placeholder for non-string payloads.
    pub message: String,
    /// The trimmed backtrace, empty when none could be captured.
    pub backtrace: String,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Runs `fut` to completion, converting a panic into a [`Fault`].
pub fn catch<F: Future>(fut: F) -> Boundary<F> {
    install_hook();
    Boundary { inner: Box::pin(fut) }
}

pub struct Boundary<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Boundary<F> {
    type Output = Result<F::Output, Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let was_armed = ARMED.with(|armed| armed.replace(true));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| self.inner.as_mut().poll(cx)));
        ARMED.with(|armed| armed.set(was_armed));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => {
                let backtrace = CAPTURED.with(|slot| slot.borrow_mut().take()).unwrap_or_default();
                Poll::Ready(Err(Fault {
                    message: panic_message(payload.as_ref()),
                    backtrace,
                }))
            }
        }
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(trim_backtrace(&trace)));
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Keeps only the frames between the panic machinery and the boundary.
///
/// Works on the rendered form of `std::backtrace::Backtrace`, where each frame
/// starts with a `N: symbol` line followed by optional `at file:line` lines.
pub(crate) fn trim_backtrace(trace: &str) -> String {
    let mut frames: Vec<Vec<&str>> = Vec::new();
    for line in trace.lines() {
        if is_frame_start(line) || frames.is_empty() {
            frames.push(vec![line]);
        } else if let Some(frame) = frames.last_mut() {
            frame.push(line);
        }
    }

    let start = frames
        .iter()
        .rposition(|f| PANIC_MACHINERY.iter().any(|m| symbol(f).contains(m)))
        .map_or(0, |i| i + 1);
    let end = frames[start..]
        .iter()
        .position(|f| BOUNDARY.iter().any(|b| symbol(f).contains(b)))
        .map_or(frames.len(), |i| start + i);

    frames[start..end]
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

fn symbol<'a>(frame: &[&'a str]) -> &'a str {
    frame.first().copied().unwrap_or_default()
}

fn is_frame_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}

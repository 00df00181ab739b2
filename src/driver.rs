use std::io::{self, Write};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::ClientConfig;
use crate::service::{FactorRequest, FactorerClient};

/// Factor count recorded for a failed call.
pub const FAILED: i64 = -1;

/// What one batch of calls did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Calls issued.
    pub calls: u64,
    /// Calls that came back with an error.
    pub failures: u64,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
}

/// Drives batches of factor calls and reports them to `out`.
pub struct Driver<W: Write> {
    client: FactorerClient,
    tries: u64,
    quiet: bool,
    time: bool,
    forever: bool,
    out: W,
}

impl<W: Write> Driver<W> {
    /// A driver configured from the client command line.
    pub fn new(client: FactorerClient, config: &ClientConfig, out: W) -> Self {
        Driver {
            client,
            tries: config.tries,
            quiet: config.quiet,
            time: config.time,
            forever: config.forever,
            out,
        }
    }

    /// Factor one target, returning the number of factors or [`FAILED`].
    ///
    /// Failures are printed as `<code>: <message>` even when quiet.
    pub fn factor(&mut self, target: i32) -> io::Result<i64> {
        if !self.quiet {
            write!(self.out, "Factor {target}: ")?;
        }

        match self.client.factor(FactorRequest { target }) {
            Ok(reply) => {
                if !self.quiet {
                    for f in &reply.factors {
                        write!(self.out, "{f} ")?;
                    }
                    writeln!(self.out)?;
                }
                Ok(reply.factors.len() as i64)
            }
            Err(e) => {
                warn!("factor {target} failed: {e}");
                let status = e.to_status();
                writeln!(self.out, "{}: {}", status.code().as_u8(), status.message())?;
                Ok(FAILED)
            }
        }
    }

    /// Issue exactly `tries` calls, drawing each target from `next_target`.
    pub fn run_batch<F>(&mut self, mut next_target: F) -> io::Result<BatchReport>
    where
        F: FnMut() -> i32,
    {
        let start = Instant::now();
        let mut failures = 0;
        for _ in 0..self.tries {
            if self.factor(next_target())? == FAILED {
                failures += 1;
            }
        }

        let report = BatchReport {
            calls: self.tries,
            failures,
            elapsed: start.elapsed(),
        };
        if self.time {
            writeln!(
                self.out,
                "Duration for {} runs = {}ms",
                report.calls,
                report.elapsed.as_secs_f64() * 1000.0
            )?;
        }
        self.out.flush()?;
        Ok(report)
    }

    /// Run one batch, or batches without end when `forever` is set.
    pub fn run<F>(&mut self, mut next_target: F) -> io::Result<BatchReport>
    where
        F: FnMut() -> i32,
    {
        loop {
            let report = self.run_batch(&mut next_target)?;
            info!(
                "batch done: calls={}, failures={}, elapsed={:?}",
                report.calls, report.failures, report.elapsed
            );
            if !self.forever {
                return Ok(report);
            }
        }
    }

    /// Give back the output, mostly useful for inspecting it.
    pub fn into_output(self) -> W {
        self.out
    }
}

/// A pseudo-random non-negative target.
pub fn random_target() -> i32 {
    rand::thread_rng().gen_range(0..=i32::MAX)
}

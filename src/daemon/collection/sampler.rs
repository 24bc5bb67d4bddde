use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    daemon::storage::{entities::Measurement, store::MeasurementSink},
    idle_api::IdleSource,
    utils::{clock::Clock, time::next_tick_boundary},
};

use super::activity::ActivityEvaluator;

/// Periodically checks whether the user is present and records a [Measurement] if so. A tick
/// without a measurement is how a period of inactivity ends up on disk.
pub struct SamplerModule<S: MeasurementSink> {
    sink: S,
    producer: Box<dyn IdleSource>,
    shutdown: CancellationToken,
    activity_evaluator: ActivityEvaluator,
    interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl<S: MeasurementSink> SamplerModule<S> {
    pub fn new(
        sink: S,
        producer: Box<dyn IdleSource>,
        shutdown: CancellationToken,
        interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            producer,
            shutdown,
            activity_evaluator: ActivityEvaluator::for_interval(interval),
            interval,
            time_provider,
        }
    }

    fn sample(&mut self) -> Result<Option<Measurement>> {
        let idle = self.producer.get_idle_time()?;
        if !self.activity_evaluator.is_active(idle) {
            debug!("Idle for {idle:?}, nothing to record");
            return Ok(None);
        }

        let idle_seconds = u32::try_from(idle.as_secs()).unwrap_or(u32::MAX);
        Ok(Some(Measurement::sample(
            self.time_provider.time(),
            idle_seconds,
        )))
    }

    /// Ticks are aligned to multiples of the interval so timestamps land on round clock times.
    fn next_tick(&self) -> Instant {
        let now = self.time_provider.time();
        let delay = chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| (next_tick_boundary(now, interval) - now).to_std().ok())
            .unwrap_or(self.interval);
        self.time_provider.instant() + delay
    }

    /// Executes the sampler event loop. Once shutdown is requested the pending measurements are
    /// flushed one last time and the loop returns.
    pub async fn run(mut self) -> Result<()> {
        loop {
            match self.sample() {
                Ok(Some(measurement)) => {
                    let span = info_span!("Recording measurement");
                    debug!("Recording {:?}", measurement);
                    match self.sink.record(measurement).instrument(span).await {
                        Ok(()) => info!("Successfully recorded measurement"),
                        // The measurement stays pending and goes out with the next flush.
                        Err(e) => error!("Failed to persist measurement {e:?}"),
                    }
                }
                Ok(None) => (),
                Err(e) => {
                    error!("Encountered an error during sampling {:?}", e)
                }
            }

            let next_tick = self.next_tick();
            let cancelled = tokio::select! {
                _ = self.shutdown.cancelled() => true,
                _ = self.time_provider.sleep_until(next_tick) => false,
            };
            if cancelled {
                break;
            }
        }

        info!("Shutdown requested, flushing pending measurements");
        self.sink
            .finalize()
            .await
            .inspect_err(|e| error!("Final flush failed {e:?}"))
    }
}

//! Metrics recording.
//!
//! # Metrics
//! - `wgloop_packets_written_total` (counter): packets accepted by device writes
//! - `wgloop_packets_read_total` (counter): packets delivered by device reads
//! - `wgloop_batches_queued` (gauge): batches waiting in the loopback queue
//! - `wgloop_control_connections_total` (counter): accepted control connections
//! - `wgloop_shutdown_total` (counter): shutdowns by termination reason
//!
//! # Recorder
//! No recorder is installed here. A program embedding the daemon installs
//! one (for example a Prometheus exporter) before startup; without it every
//! call below is a no-op.

use metrics::{counter, gauge};

pub fn record_packets_written(count: usize) {
    counter!("wgloop_packets_written_total").increment(count as u64);
}

pub fn record_packets_read(count: usize) {
    counter!("wgloop_packets_read_total").increment(count as u64);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("wgloop_batches_queued").set(depth as f64);
}

pub fn record_control_connection() {
    counter!("wgloop_control_connections_total").increment(1);
}

pub fn record_shutdown(reason: &'static str) {
    counter!("wgloop_shutdown_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Counts shutdowns labelled `reason=signal`, ignores everything else.
    #[derive(Default)]
    struct SignalShutdowns(Arc<AtomicU64>);

    impl Recorder for SignalShutdowns {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let is_signal = key.name() == "wgloop_shutdown_total"
                && key
                    .labels()
                    .any(|label| label.key() == "reason" && label.value() == "signal");
            if is_signal {
                Counter::from_arc(Arc::clone(&self.0))
            } else {
                Counter::noop()
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn installed_recorder_sees_labelled_shutdowns() {
        let recorder = SignalShutdowns::default();
        metrics::with_local_recorder(&recorder, || {
            record_shutdown("signal");
            record_shutdown("engine");
            record_packets_written(3);
        });
        assert_eq!(recorder.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        record_packets_read(5);
        record_queue_depth(2);
        record_control_connection();
    }
}

//! Alert and monitoring-data senders

use crate::models::{InstanceQuotaAlert, NodeMonitoringData, QuotaAlertRecord, SystemQuotaAlert};
use crate::observability::StructuredLogger;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sink for quota alerts; calls must not block
pub trait AlertSender: Send + Sync {
    fn send_system_quota_alert(&self, alert: SystemQuotaAlert);

    fn send_instance_quota_alert(&self, alert: InstanceQuotaAlert);
}

/// Sink for composed node snapshots; calls must not block
pub trait MonitoringSender: Send + Sync {
    fn send_monitoring_data(&self, data: NodeMonitoringData);
}

/// Bounded channel sender that drops snapshots when the consumer lags
#[derive(Clone)]
pub struct ChannelMonitoringSender {
    tx: mpsc::Sender<NodeMonitoringData>,
}

impl ChannelMonitoringSender {
    pub fn new(tx: mpsc::Sender<NodeMonitoringData>) -> Self {
        Self { tx }
    }
}

/// Create a snapshot channel holding at most `buffer` snapshots
pub fn monitoring_channel(
    buffer: usize,
) -> (ChannelMonitoringSender, mpsc::Receiver<NodeMonitoringData>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelMonitoringSender::new(tx), rx)
}

impl MonitoringSender for ChannelMonitoringSender {
    fn send_monitoring_data(&self, data: NodeMonitoringData) {
        match self.tx.try_send(data) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(data)) => {
                warn!(
                    timestamp = %data.timestamp,
                    "Monitoring channel full, dropping snapshot"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Monitoring channel closed, dropping snapshot");
            }
        }
    }
}

/// Forwards alerts into an unbounded channel
#[derive(Clone)]
pub struct ChannelAlertSender {
    tx: mpsc::UnboundedSender<QuotaAlertRecord>,
}

impl ChannelAlertSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QuotaAlertRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, record: QuotaAlertRecord) {
        if self.tx.send(record).is_err() {
            debug!("Alert channel closed, dropping alert");
        }
    }
}

impl AlertSender for ChannelAlertSender {
    fn send_system_quota_alert(&self, alert: SystemQuotaAlert) {
        self.forward(QuotaAlertRecord::SystemQuotaAlert(alert));
    }

    fn send_instance_quota_alert(&self, alert: InstanceQuotaAlert) {
        self.forward(QuotaAlertRecord::InstanceQuotaAlert(alert));
    }
}

/// Writes alerts to the structured log
#[derive(Clone)]
pub struct LoggingAlertSender {
    logger: StructuredLogger,
}

impl LoggingAlertSender {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

impl AlertSender for LoggingAlertSender {
    fn send_system_quota_alert(&self, alert: SystemQuotaAlert) {
        self.logger.log_quota_alert("system", &alert.alert);
    }

    fn send_instance_quota_alert(&self, alert: InstanceQuotaAlert) {
        self.logger
            .log_quota_alert(&alert.instance_ident.to_string(), &alert.alert);
    }
}

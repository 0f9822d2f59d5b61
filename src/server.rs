use std::sync::Arc;

use tracing::info;

use crate::aggregator::WindowHandle;
use crate::collector::{TcpCollector, UdpCollector};
use crate::config::Config;
use crate::flusher::Flusher;
use crate::liveness::LivenessResponder;
use crate::sink::{GraphiteSink, Sink};
use crate::stats::shared_stats;

pub struct MetricDaemon {
    config: Config,
}

impl MetricDaemon {
    pub fn new(config: Config) -> Self {
        MetricDaemon { config }
    }

    /// Bind all listeners, spawn the ingestion front-ends, and run the
    /// flush scheduler until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.config.validate()?;

        let stats = shared_stats();
        let settings = self.config.fold_settings();
        let window = WindowHandle::new(settings);
        let sink: Arc<dyn Sink> = Arc::new(GraphiteSink::new(
            self.config.store.addr.clone(),
            self.config.store.prefix.clone(),
            self.config.store.max_attempts,
        ));

        let udp = UdpCollector::bind(&self.config.udp_bind, window.clone(), stats.clone()).await?;
        tokio::spawn(udp.run());

        let tcp = TcpCollector::bind(
            &self.config.tcp_bind,
            window.clone(),
            stats.clone(),
            self.config.tcp_read_timeout(),
        )
        .await?;
        tokio::spawn(tcp.run());

        if let Some(addr) = &self.config.liveness_bind {
            let liveness = LivenessResponder::bind(addr).await?;
            tokio::spawn(liveness.run());
        }

        let (flusher, handle) = Flusher::new(
            window,
            sink,
            settings,
            self.config.flush_interval(),
            stats.clone(),
        );
        let flush_task = tokio::spawn(flusher.run());

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        handle.shutdown();
        flush_task.await?;

        info!(
            accepted = stats.lines_accepted(),
            rejected = stats.lines_rejected(),
            windows = stats.windows_flushed(),
            dropped = stats.batches_dropped(),
            "metricd stopped"
        );
        Ok(())
    }
}

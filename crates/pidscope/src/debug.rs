use iggy::client::producer::ProducerOptions;
use iggy::client::tcp_client::TcpClient;
use iggy::client::tcp_client::TcpClientConfig;
use iggy::client::Client;
use iggy::client::MessageClient;
use iggy::client::StreamClient;
use iggy::models::message::{Message, Messages, PartitionId};
use iggy::models::stream::{Stream, StreamId};
use iggy::models::topic::{Topic, TopicId};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, Sender};

use crate::controller::TermBreakdown;
use crate::session::{Frame, PresentationSink, SessionError};

/// Configuration for the controller debug stream
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// URL of the iggy server
    pub iggy_url: String,
    /// Stream name for debugging data
    pub stream_name: String,
    /// Topic name for this controller's data
    pub topic_name: String,
    /// Unique ID for this controller instance
    pub controller_id: String,
    /// Optional sampling rate (in Hz) for debug data
    pub sample_rate_hz: Option<f64>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        DebugConfig {
            iggy_url: "127.0.0.1:8090".to_string(),
            stream_name: "pidscope_debug".to_string(),
            topic_name: "controller_data".to_string(),
            controller_id: format!("controller_{}", rand::random::<u32>()),
            sample_rate_hz: None,
        }
    }
}

/// One tick of controller state as published to the stream
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControllerDebugData {
    /// Timestamp in milliseconds since UNIX epoch
    pub timestamp: u64,
    /// Controller ID
    pub controller_id: String,
    /// Measurements recorded so far
    pub sample: usize,
    /// Latest measurement
    pub value: f64,
    pub setpoint: f64,
    /// Seconds since the last setpoint change
    pub elapsed: f64,
    #[serde(flatten)]
    pub terms: TermBreakdown,
}

/// Sink that publishes every presented frame to iggy.
///
/// Publishing happens on a background thread running its own tokio runtime;
/// `present` only enqueues and never blocks the control loop.
pub struct IggySink {
    config: DebugConfig,
    tx: Sender<ControllerDebugData>,
    last_sample: Option<Instant>,
    sample_interval: Option<Duration>,
}

impl IggySink {
    /// Create a new sink and start its publishing thread
    pub fn new(config: DebugConfig) -> Result<Self, SessionError> {
        let (tx, mut rx) = mpsc::channel::<ControllerDebugData>(100);

        // Clone values for the background thread
        let iggy_url = config.iggy_url.clone();
        let stream_name = config.stream_name.clone();
        let topic_name = config.topic_name.clone();

        let sample_interval = config
            .sample_rate_hz
            .filter(|rate| *rate > 0.0)
            .map(|rate| Duration::from_secs_f64(1.0 / rate));

        let rt = Runtime::new()?;

        thread::spawn(move || {
            rt.block_on(async {
                let client_config = TcpClientConfig::default();
                let mut client = TcpClient::new(client_config);

                if let Err(e) = client.connect(&iggy_url).await {
                    error!("failed to connect to iggy server at {}: {}", iggy_url, e);
                    return;
                }

                ensure_stream_and_topic(&mut client, &stream_name, &topic_name).await;

                while let Some(debug_data) = rx.recv().await {
                    let payload = match serde_json::to_vec(&debug_data) {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!("failed to serialize debug data: {}", e);
                            continue;
                        }
                    };

                    let messages = Messages::from(vec![Message::new(payload)]);
                    if let Err(e) = client
                        .send_messages(
                            &StreamId::from_name(&stream_name),
                            &TopicId::from_name(&topic_name),
                            &PartitionId::from(0),
                            &messages,
                            &ProducerOptions::default(),
                        )
                        .await
                    {
                        error!("error sending debug data: {}", e);
                    }
                }
            });
        });

        Ok(IggySink {
            config,
            tx,
            last_sample: None,
            sample_interval,
        })
    }

    fn due(&mut self) -> bool {
        let now = Instant::now();
        match (self.sample_interval, self.last_sample) {
            (Some(interval), Some(last)) if now.duration_since(last) < interval => false,
            _ => {
                self.last_sample = Some(now);
                true
            }
        }
    }
}

impl PresentationSink for IggySink {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SessionError> {
        let (Some(terms), Some(value)) = (frame.terms, frame.last_value) else {
            return Ok(());
        };
        if !self.due() {
            return Ok(());
        }

        let debug_data = ControllerDebugData {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            controller_id: self.config.controller_id.clone(),
            sample: frame.history.len(),
            value,
            setpoint: frame.setpoint,
            elapsed: frame.elapsed,
            terms,
        };

        // A full queue drops the sample rather than stalling the loop
        if let Err(e) = self.tx.try_send(debug_data) {
            warn!("dropped debug data: {}", e);
        }
        Ok(())
    }
}

/// Ensure that the stream and topic exist on the iggy server
async fn ensure_stream_and_topic(client: &mut TcpClient, stream_name: &str, topic_name: &str) {
    // Both calls fail harmlessly when the resource already exists
    let _ = client
        .create_stream(&Stream::new(stream_name, "PID controller debug data"))
        .await;

    let _ = client
        .create_topic(
            &StreamId::from_name(stream_name),
            &Topic::new(topic_name, 1, None), // 1 partition
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_data_serializes_flat() {
        let data = ControllerDebugData {
            timestamp: 1,
            controller_id: "hvac".to_string(),
            sample: 2,
            value: 590.0,
            setpoint: 500.0,
            elapsed: 0.5,
            terms: TermBreakdown {
                error: -90.0,
                proportional: -45.0,
                integral: -78.0,
                derivative: 63.0,
                output: -60.0,
            },
        };

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["output"], -60.0);
        assert_eq!(json["controller_id"], "hvac");

        let back: ControllerDebugData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_default_config() {
        let config = DebugConfig::default();
        assert_eq!(config.iggy_url, "127.0.0.1:8090");
        assert!(config.controller_id.starts_with("controller_"));
        assert!(config.sample_rate_hz.is_none());
    }
}
